//! Escrow conservation invariant checker.
//!
//! Checked after every payout:
//! ```text
//! ∀ agreement: held == Σ(deposits) - Σ(payouts)
//! ```
//!
//! A violation means value was created or destroyed somewhere between the
//! escrow pool, sub-channel custody, and the party wallets.

use std::collections::HashMap;

use metachannel_types::{AgreementId, Amount, ChannelError, Result};

/// Per-agreement deposit and payout totals.
#[derive(Debug, Clone, Default)]
pub struct EscrowConservation {
    deposits: HashMap<AgreementId, Amount>,
    payouts: HashMap<AgreementId, Amount>,
}

impl EscrowConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, agreement: AgreementId, amount: Amount) -> Result<()> {
        let total = self.deposits.entry(agreement).or_insert(Amount::ZERO);
        *total = total.checked_add(amount)?;
        Ok(())
    }

    pub fn record_payout(&mut self, agreement: AgreementId, amount: Amount) -> Result<()> {
        let total = self.payouts.entry(agreement).or_insert(Amount::ZERO);
        *total = total.checked_add(amount)?;
        Ok(())
    }

    #[must_use]
    pub fn total_deposits(&self, agreement: &AgreementId) -> Amount {
        self.deposits.get(agreement).copied().unwrap_or(Amount::ZERO)
    }

    #[must_use]
    pub fn total_payouts(&self, agreement: &AgreementId) -> Amount {
        self.payouts.get(agreement).copied().unwrap_or(Amount::ZERO)
    }

    /// `deposits - payouts`; paying out more than was deposited is itself a violation.
    pub fn expected_held(&self, agreement: &AgreementId) -> Result<Amount> {
        self.total_deposits(agreement)
            .checked_sub(self.total_payouts(agreement))
            .map_err(|_| ChannelError::BalanceConservationViolation {
                reason: format!(
                    "agreement {agreement}: payouts {} exceed deposits {}",
                    self.total_payouts(agreement),
                    self.total_deposits(agreement)
                ),
            })
    }

    /// Verify that `actual_held` (pool plus custody) matches the books.
    pub fn verify(&self, agreement: &AgreementId, actual_held: Amount) -> Result<()> {
        let expected = self.expected_held(agreement)?;
        if actual_held != expected {
            return Err(ChannelError::BalanceConservationViolation {
                reason: format!(
                    "agreement {agreement}: held {actual_held} != expected {expected} \
                     (deposits={}, payouts={})",
                    self.total_deposits(agreement),
                    self.total_payouts(agreement),
                ),
            });
        }
        Ok(())
    }
}
