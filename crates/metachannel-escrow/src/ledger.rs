//! Escrow ledger: the only component that moves value.
//!
//! ```text
//!   open_agreement (A deposits) ─▶ PENDING ─join_agreement (B deposits)─▶ ACTIVE
//!
//!   ACTIVE:   pool ──close_subchannel──▶ custody[channel] ──release_subchannel──▶ wallets
//!             pool ─────────────────────close_with_metachannel──────────────────▶ wallets
//!
//!   close_with_metachannel empties the pool ─▶ CLOSED
//! ```
//!
//! Payouts follow the outcomes the deployed [`MetaChannel`] reports; the
//! ledger itself never judges which state is final. After every payout the
//! agreement's holdings are reconciled against its deposits and payouts.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};

use metachannel_core::recover;
use metachannel_settlement::{
    EscrowConservation, MetaChannel, MetaChannelOutcome, SubChannelOutcome,
};
use metachannel_types::{
    Address, AgreementId, Amount, CanonicalState, ChannelError, ChannelId, H256,
    MetaChannelState, Result, Signature, SubChannelPhase, TwoPartyState, keccak256,
};
use serde::{Deserialize, Serialize};

use crate::registry::Registry;

/// Lifecycle of an escrow agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementStatus {
    /// Party A has deposited; waiting for party B.
    Pending,
    /// Both deposits in; settlements may draw on the pool.
    Active,
    /// Meta-channel paid out; the agreement holds nothing. **Terminal.**
    Closed,
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Funds locked against one meta-channel's initial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAgreement {
    pub id: AgreementId,
    pub status: AgreementStatus,
    /// `keccak256` of the canonical initial-state bytes both parties signed.
    pub state_hash: H256,
    pub initial_state: MetaChannelState,
    /// Interpreter / extension the agreement was opened for.
    pub extension: Address,
    /// Value not yet assigned to any settlement.
    pub pool: Amount,
    /// Value set aside for sub-channels in settlement.
    pub custody: BTreeMap<ChannelId, Amount>,
    /// Sub-channels already paid out.
    pub released: BTreeSet<ChannelId>,
}

impl EscrowAgreement {
    /// Counterfactual address of the meta-channel this agreement funds.
    #[must_use]
    pub fn metachannel(&self) -> Address {
        self.initial_state.metachannel_address
    }

    /// Pool plus every custody bucket.
    pub fn held(&self) -> Result<Amount> {
        self.custody
            .values()
            .try_fold(self.pool, |acc, amount| acc.checked_add(*amount))
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status != AgreementStatus::Active {
            return Err(ChannelError::invalid_state(format!(
                "agreement {} is {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// All escrow agreements plus the wallets payouts land in.
#[derive(Debug, Default)]
pub struct EscrowLedger {
    agreements: HashMap<AgreementId, EscrowAgreement>,
    wallets: HashMap<Address, Amount>,
    conservation: EscrowConservation,
}

impl EscrowLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- queries ----------------------------------------------------------

    pub fn agreement(&self, id: &AgreementId) -> Result<&EscrowAgreement> {
        self.agreements
            .get(id)
            .ok_or(ChannelError::AgreementNotFound(*id))
    }

    /// Total paid out to `address` so far.
    #[must_use]
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.wallets.get(address).copied().unwrap_or(Amount::ZERO)
    }

    /// Everything the agreement still holds.
    pub fn held(&self, id: &AgreementId) -> Result<Amount> {
        self.agreement(id)?.held()
    }

    fn agreement_mut(&mut self, id: &AgreementId) -> Result<&mut EscrowAgreement> {
        self.agreements
            .get_mut(id)
            .ok_or(ChannelError::AgreementNotFound(*id))
    }

    /// Decode and check the shape of a sequence-0 meta-state.
    fn decode_initial(bytes: &[u8]) -> Result<MetaChannelState> {
        let state = MetaChannelState::decode(bytes)?;
        if state.sequence != 0 {
            return Err(ChannelError::invalid_state(format!(
                "initial state must have sequence 0, got {}",
                state.sequence
            )));
        }
        if state.is_closed {
            return Err(ChannelError::invalid_state("initial state is closed"));
        }
        if !state.subchannel_root.is_zero() {
            return Err(ChannelError::invalid_state(
                "initial state already commits to sub-channels",
            ));
        }
        Ok(state)
    }

    /// The signature must recover to `expected`, and `expected` must be the depositor.
    fn check_depositor(
        state: &MetaChannelState,
        sig: &Signature,
        expected: Address,
        depositor: Address,
    ) -> Result<()> {
        let signer = recover(&state.hash(), sig)?;
        if signer != expected || depositor != expected {
            tracing::warn!(
                signer = %signer,
                depositor = %depositor,
                expected = %expected,
                "Escrow deposit from wrong party"
            );
            return Err(ChannelError::invalid_signature(format!(
                "deposit signed by {signer} from {depositor}, expected {expected}"
            )));
        }
        Ok(())
    }

    // -- funding ----------------------------------------------------------

    /// Party A opens an agreement by depositing `balance_a` against the
    /// initial state it signed.
    pub fn open_agreement(
        &mut self,
        initial_state_bytes: &[u8],
        extension: Address,
        sig: &Signature,
        depositor: Address,
        deposit: Amount,
    ) -> Result<AgreementId> {
        let state = Self::decode_initial(initial_state_bytes)?;
        Self::check_depositor(&state, sig, state.party_a, depositor)?;
        if deposit != state.balance_a {
            return Err(ChannelError::DepositMismatch {
                expected: state.balance_a,
                actual: deposit,
            });
        }

        let id = AgreementId::new();
        self.conservation.record_deposit(id, deposit)?;
        tracing::info!(
            agreement = %id,
            metachannel = %state.metachannel_address,
            depositor = %depositor,
            deposit = %deposit,
            "Escrow agreement opened"
        );
        self.agreements.insert(
            id,
            EscrowAgreement {
                id,
                status: AgreementStatus::Pending,
                state_hash: keccak256(initial_state_bytes),
                initial_state: state,
                extension,
                pool: deposit,
                custody: BTreeMap::new(),
                released: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    /// Party B joins with `balance_b` against the same initial state.
    pub fn join_agreement(
        &mut self,
        id: AgreementId,
        initial_state_bytes: &[u8],
        extension: Address,
        sig: &Signature,
        depositor: Address,
        deposit: Amount,
    ) -> Result<()> {
        let agreement = self.agreement(&id)?;
        if agreement.status != AgreementStatus::Pending {
            return Err(ChannelError::invalid_state(format!(
                "agreement {id} is {}, not PENDING",
                agreement.status
            )));
        }
        if keccak256(initial_state_bytes) != agreement.state_hash {
            return Err(ChannelError::invalid_state(
                "join names a different initial state",
            ));
        }
        if extension != agreement.extension {
            return Err(ChannelError::invalid_state(
                "join names a different extension",
            ));
        }
        let state = Self::decode_initial(initial_state_bytes)?;
        Self::check_depositor(&state, sig, state.party_b, depositor)?;
        if deposit != state.balance_b {
            return Err(ChannelError::DepositMismatch {
                expected: state.balance_b,
                actual: deposit,
            });
        }
        let pool = agreement.pool.checked_add(deposit)?;

        self.conservation.record_deposit(id, deposit)?;
        let agreement = self.agreement_mut(&id)?;
        agreement.pool = pool;
        agreement.status = AgreementStatus::Active;
        tracing::info!(
            agreement = %id,
            depositor = %depositor,
            deposit = %deposit,
            pool = %pool,
            "Escrow agreement active"
        );
        Ok(())
    }

    // -- payouts ----------------------------------------------------------

    /// Move a disputed sub-channel's total from the pool into custody and
    /// mark it `Settling`.
    pub fn close_subchannel(
        &mut self,
        id: AgreementId,
        registry: &mut Registry<MetaChannel>,
        channel_id: &ChannelId,
    ) -> Result<()> {
        let agreement = self.agreement(&id)?;
        agreement.ensure_active()?;
        let metachannel = registry.get_mut(&agreement.metachannel())?;
        let record = metachannel
            .subchannel(channel_id)
            .ok_or(ChannelError::UnknownSubChannel(*channel_id))?;
        if record.phase != SubChannelPhase::Disputed {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel {channel_id} is {}, not DISPUTED",
                record.phase
            )));
        }
        let total = record.state.total()?;
        let pool = agreement
            .pool
            .checked_sub(total)
            .map_err(|_| ChannelError::InsufficientEscrow {
                needed: total,
                held: agreement.pool,
            })?;

        metachannel.begin_settling(channel_id)?;
        let agreement = self.agreement_mut(&id)?;
        agreement.pool = pool;
        agreement.custody.insert(*channel_id, total);
        tracing::info!(
            agreement = %id,
            channel_id = %channel_id,
            custody = %total,
            "Sub-channel funds moved to custody"
        );
        Ok(())
    }

    /// Pay out a closed sub-channel. Runs at most once per sub-channel.
    /// A cooperatively closed sub-channel is left to the meta payout.
    pub fn release_subchannel(
        &mut self,
        id: AgreementId,
        registry: &Registry<MetaChannel>,
        channel_id: &ChannelId,
    ) -> Result<SubChannelOutcome> {
        let agreement = self.agreement(&id)?;
        agreement.ensure_active()?;
        if agreement.released.contains(channel_id) {
            return Err(ChannelError::AlreadyReleased {
                reason: format!("sub-channel {channel_id}"),
            });
        }
        let metachannel = registry.get(&agreement.metachannel())?;
        if metachannel
            .subchannel(channel_id)
            .is_some_and(|r| r.state.is_closed)
        {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel {channel_id} closed cooperatively and settles through the meta-channel"
            )));
        }
        let outcome = metachannel
            .finalized_subchannels()
            .into_iter()
            .find(|o| o.channel_id == *channel_id)
            .ok_or_else(|| {
                ChannelError::invalid_state(format!("sub-channel {channel_id} is not closed"))
            })?;
        let total = outcome.total()?;

        let mut pool = agreement.pool;
        let custody = match agreement.custody.get(channel_id) {
            Some(amount) => *amount,
            None => {
                pool = pool
                    .checked_sub(total)
                    .map_err(|_| ChannelError::InsufficientEscrow {
                        needed: total,
                        held: agreement.pool,
                    })?;
                total
            }
        };
        if custody != total {
            return Err(ChannelError::BalanceConservationViolation {
                reason: format!(
                    "sub-channel {channel_id}: custody {custody} != final total {total}"
                ),
            });
        }
        let credit_a = self.balance_of(&outcome.party_a).checked_add(outcome.balance_a)?;
        let credit_b = self.balance_of(&outcome.party_b).checked_add(outcome.balance_b)?;

        // -- validation complete; move value --
        let agreement = self.agreement_mut(&id)?;
        agreement.pool = pool;
        agreement.custody.remove(channel_id);
        agreement.released.insert(*channel_id);
        let held = agreement.held()?;
        self.wallets.insert(outcome.party_a, credit_a);
        self.wallets.insert(outcome.party_b, credit_b);
        self.conservation.record_payout(id, total)?;
        self.conservation.verify(&id, held)?;
        tracing::info!(
            agreement = %id,
            channel_id = %channel_id,
            balance_a = %outcome.balance_a,
            balance_b = %outcome.balance_b,
            "Sub-channel released"
        );
        Ok(outcome)
    }

    /// Pay out the meta-channel's final balances and close the agreement.
    ///
    /// Every disputed sub-channel must already be released, and the escrow
    /// must hold exactly the meta-channel's total. Sub-channels closed
    /// cooperatively are paid inside the meta balances, including any
    /// custody they still hold.
    pub fn close_with_metachannel(
        &mut self,
        id: AgreementId,
        registry: &Registry<MetaChannel>,
    ) -> Result<MetaChannelOutcome> {
        let agreement = self.agreement(&id)?;
        if agreement.status == AgreementStatus::Closed {
            return Err(ChannelError::AlreadyReleased {
                reason: format!("agreement {id}"),
            });
        }
        agreement.ensure_active()?;
        let metachannel = registry.get(&agreement.metachannel())?;
        let outcome = metachannel.meta_outcome().ok_or_else(|| {
            ChannelError::invalid_state(format!(
                "meta-channel is {}",
                metachannel.metachannel().phase
            ))
        })?;
        if let Some(pending) = metachannel
            .subchannels()
            .find(|r| !r.state.is_closed && !agreement.released.contains(&r.channel_id))
        {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel {} is {} and not yet released",
                pending.channel_id, pending.phase
            )));
        }
        let total = outcome.total()?;
        let held = agreement.held()?;
        if held != total {
            tracing::warn!(
                agreement = %id,
                held = %held,
                payout = %total,
                "Meta-channel payout does not drain the escrow"
            );
            return Err(ChannelError::BalanceConservationViolation {
                reason: format!("agreement {id} holds {held}, meta-channel pays {total}"),
            });
        }
        let credit_a = self.balance_of(&outcome.party_a).checked_add(outcome.balance_a)?;
        let credit_b = self.balance_of(&outcome.party_b).checked_add(outcome.balance_b)?;

        // -- validation complete; move value --
        let agreement = self.agreement_mut(&id)?;
        agreement.pool = Amount::ZERO;
        agreement.custody.clear();
        agreement.status = AgreementStatus::Closed;
        self.wallets.insert(outcome.party_a, credit_a);
        self.wallets.insert(outcome.party_b, credit_b);
        self.conservation.record_payout(id, total)?;
        self.conservation.verify(&id, Amount::ZERO)?;
        tracing::info!(
            agreement = %id,
            balance_a = %outcome.balance_a,
            balance_b = %outcome.balance_b,
            "Escrow agreement closed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use metachannel_core::{PartyKey, sign};

    use super::*;

    struct Setup {
        a: PartyKey,
        b: PartyKey,
        bytes: Vec<u8>,
        sig_a: Signature,
        sig_b: Signature,
    }

    const EXT: Address = Address([0xE1; 20]);

    fn setup() -> Setup {
        let a = PartyKey::from_label("alice").unwrap();
        let b = PartyKey::from_label("bob").unwrap();
        let s0 = MetaChannelState::genesis(
            a.address(),
            b.address(),
            Address([0x33; 20]),
            Amount::ether(10),
            Amount::ether(20),
        );
        let hash = s0.hash();
        Setup {
            sig_a: sign(&a, &hash).unwrap(),
            sig_b: sign(&b, &hash).unwrap(),
            bytes: s0.encode(),
            a,
            b,
        }
    }

    #[test]
    fn open_and_join() {
        let s = setup();
        let mut ledger = EscrowLedger::new();
        let id = ledger
            .open_agreement(&s.bytes, EXT, &s.sig_a, s.a.address(), Amount::ether(10))
            .unwrap();
        assert_eq!(ledger.agreement(&id).unwrap().status, AgreementStatus::Pending);
        assert_eq!(ledger.held(&id).unwrap(), Amount::ether(10));

        ledger
            .join_agreement(id, &s.bytes, EXT, &s.sig_b, s.b.address(), Amount::ether(20))
            .unwrap();
        assert_eq!(ledger.agreement(&id).unwrap().status, AgreementStatus::Active);
        assert_eq!(ledger.held(&id).unwrap(), Amount::ether(30));
    }

    #[test]
    fn open_rejects_wrong_deposit() {
        let s = setup();
        let mut ledger = EscrowLedger::new();
        let err = ledger
            .open_agreement(&s.bytes, EXT, &s.sig_a, s.a.address(), Amount::ether(9))
            .unwrap_err();
        assert!(matches!(err, ChannelError::DepositMismatch { .. }));
    }

    #[test]
    fn open_rejects_party_b_signature() {
        let s = setup();
        let mut ledger = EscrowLedger::new();
        let err = ledger
            .open_agreement(&s.bytes, EXT, &s.sig_b, s.a.address(), Amount::ether(10))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidSignature { .. }));
        let err = ledger
            .open_agreement(&s.bytes, EXT, &s.sig_a, s.b.address(), Amount::ether(10))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidSignature { .. }));
    }

    #[test]
    fn open_rejects_non_initial_state() {
        let s = setup();
        let mut state = MetaChannelState::decode(&s.bytes).unwrap();
        state.sequence = 1;
        let sig = sign(&s.a, &state.hash()).unwrap();
        let mut ledger = EscrowLedger::new();
        let err = ledger
            .open_agreement(&state.encode(), EXT, &sig, s.a.address(), Amount::ether(10))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidState { .. }));

        let err = ledger
            .open_agreement(&s.bytes[..64], EXT, &s.sig_a, s.a.address(), Amount::ether(10))
            .unwrap_err();
        assert!(matches!(err, ChannelError::MalformedState { .. }));
    }

    #[test]
    fn join_rejects_mismatches() {
        let s = setup();
        let mut ledger = EscrowLedger::new();
        let id = ledger
            .open_agreement(&s.bytes, EXT, &s.sig_a, s.a.address(), Amount::ether(10))
            .unwrap();

        let other_ext = Address([0xE2; 20]);
        let b = s.b.address();
        assert!(
            ledger
                .join_agreement(id, &s.bytes, other_ext, &s.sig_b, b, Amount::ether(20))
                .is_err()
        );
        let err = ledger
            .join_agreement(id, &s.bytes, EXT, &s.sig_b, s.b.address(), Amount::ether(19))
            .unwrap_err();
        assert!(matches!(err, ChannelError::DepositMismatch { .. }));
        let unknown = AgreementId::new();
        let err = ledger
            .join_agreement(unknown, &s.bytes, EXT, &s.sig_b, b, Amount::ether(20))
            .unwrap_err();
        assert!(matches!(err, ChannelError::AgreementNotFound(_)));

        assert_eq!(ledger.held(&id).unwrap(), Amount::ether(10));
        ledger
            .join_agreement(id, &s.bytes, EXT, &s.sig_b, s.b.address(), Amount::ether(20))
            .unwrap();
        let err = ledger
            .join_agreement(id, &s.bytes, EXT, &s.sig_b, s.b.address(), Amount::ether(20))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidState { .. }));
    }

    #[test]
    fn pending_agreement_cannot_pay_out() {
        let s = setup();
        let mut ledger = EscrowLedger::new();
        let id = ledger
            .open_agreement(&s.bytes, EXT, &s.sig_a, s.a.address(), Amount::ether(10))
            .unwrap();
        let registry = Registry::<MetaChannel>::new(Address([0xEE; 20]));
        let err = ledger.close_with_metachannel(id, &registry).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidState { .. }));
        assert_eq!(ledger.balance_of(&s.a.address()), Amount::ZERO);
    }
}
