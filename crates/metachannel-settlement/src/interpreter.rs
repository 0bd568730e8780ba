//! Sub-channel interpreters.
//!
//! An interpreter decides whether one sub-channel state may follow another.
//! The settlement contract looks interpreters up by the
//! `interpreter_address` carried in each sub-channel state; an address with
//! nothing registered is rejected.
//!
//! A deployment names its interpreters by `(address, code_hash)` pairs.
//! [`builtin_interpreter`] turns a code hash back into an implementation.

use std::{collections::HashMap, fmt, sync::Arc};

use metachannel_types::{
    Address, ChannelError, H256, Result, SubChannelState, TwoPartyState, constants, keccak256,
};

/// Validates sub-channel transitions for one application.
pub trait SubChannelInterpreter: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Identifies the implementation inside signed deployment arguments.
    fn code_hash(&self) -> H256;

    /// `previous` is `None` when the sub-channel is first disputed.
    fn validate_transition(
        &self,
        previous: Option<&SubChannelState>,
        next: &SubChannelState,
    ) -> Result<()>;
}

/// Two-way payments: value moves between the parties, the total never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BidirectionalPayment;

impl BidirectionalPayment {
    #[must_use]
    pub fn template_hash() -> H256 {
        keccak256(format!("{}.BidirectionalPayment", constants::ENGINE_NAME).as_bytes())
    }
}

impl SubChannelInterpreter for BidirectionalPayment {
    fn name(&self) -> &'static str {
        "bidirectional-payment"
    }

    fn code_hash(&self) -> H256 {
        Self::template_hash()
    }

    fn validate_transition(
        &self,
        previous: Option<&SubChannelState>,
        next: &SubChannelState,
    ) -> Result<()> {
        let next_total = next.total()?;
        let Some(previous) = previous else {
            return Ok(());
        };
        let previous_total = previous.total()?;
        if next_total != previous_total {
            return Err(ChannelError::BalanceConservationViolation {
                reason: format!(
                    "sub-channel {} total changed from {previous_total} to {next_total}",
                    next.channel_id
                ),
            });
        }
        Ok(())
    }
}

/// The interpreter implementation behind `code_hash`, if one ships with
/// this crate.
#[must_use]
pub fn builtin_interpreter(code_hash: &H256) -> Option<Arc<dyn SubChannelInterpreter>> {
    (*code_hash == BidirectionalPayment::template_hash())
        .then(|| Arc::new(BidirectionalPayment) as Arc<dyn SubChannelInterpreter>)
}

/// Interpreters keyed by address.
#[derive(Debug, Clone, Default)]
pub struct InterpreterSet {
    by_address: HashMap<Address, Arc<dyn SubChannelInterpreter>>,
}

impl InterpreterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A set with [`BidirectionalPayment`] at `address`.
    #[must_use]
    pub fn with_bidirectional(address: Address) -> Self {
        let mut set = Self::new();
        set.register(address, Arc::new(BidirectionalPayment));
        set
    }

    /// Register `interpreter` at `address`, replacing any previous one.
    pub fn register(&mut self, address: Address, interpreter: Arc<dyn SubChannelInterpreter>) {
        self.by_address.insert(address, interpreter);
    }

    /// Rebuild a set from `(address, code_hash)` pairs.
    ///
    /// # Errors
    /// `IdentityMismatch` if a code hash has no built-in implementation.
    pub fn from_bindings(bindings: &[(Address, H256)]) -> Result<Self> {
        let mut set = Self::new();
        for (address, code_hash) in bindings {
            let interpreter =
                builtin_interpreter(code_hash).ok_or_else(|| ChannelError::IdentityMismatch {
                    reason: format!("no interpreter with code hash {code_hash} at {address}"),
                })?;
            set.register(*address, interpreter);
        }
        Ok(set)
    }

    /// `(address, code_hash)` for every entry, ordered by address.
    #[must_use]
    pub fn bindings(&self) -> Vec<(Address, H256)> {
        let mut bindings: Vec<_> = self
            .by_address
            .iter()
            .map(|(address, interpreter)| (*address, interpreter.code_hash()))
            .collect();
        bindings.sort_by_key(|(address, _)| *address);
        bindings
    }

    pub fn get(&self, address: &Address) -> Result<&Arc<dyn SubChannelInterpreter>> {
        self.by_address
            .get(address)
            .ok_or(ChannelError::UnknownInterpreter(*address))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use metachannel_types::{Amount, ChannelId};

    use super::*;

    fn sub(a: u64, b: u64) -> SubChannelState {
        SubChannelState::dummy(
            ChannelId::from_salt("salt1"),
            Address([1; 20]),
            Address([2; 20]),
            Address([3; 20]),
            Amount::ether(a),
            Amount::ether(b),
        )
    }

    #[test]
    fn payment_conserving_total_accepted() {
        let prev = sub(0, 10);
        let next = prev.with_payment(Amount::ether(1), Amount::ether(9));
        BidirectionalPayment
            .validate_transition(Some(&prev), &next)
            .unwrap();
    }

    #[test]
    fn payment_creating_value_rejected() {
        let prev = sub(0, 10);
        let next = prev.with_payment(Amount::ether(5), Amount::ether(9));
        let err = BidirectionalPayment
            .validate_transition(Some(&prev), &next)
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::BalanceConservationViolation { .. }
        ));
    }

    #[test]
    fn first_state_accepted() {
        BidirectionalPayment.validate_transition(None, &sub(5, 0)).unwrap();
    }

    #[test]
    fn overflowing_first_state_rejected() {
        let mut s = sub(0, 0);
        s.balance_a = Amount(u128::MAX);
        s.balance_b = Amount(1);
        assert!(BidirectionalPayment.validate_transition(None, &s).is_err());
    }

    #[test]
    fn lookup_by_address() {
        let set = InterpreterSet::with_bidirectional(Address([0xE1; 20]));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&Address([0xE1; 20])).unwrap().name(),
            "bidirectional-payment"
        );
        assert!(matches!(
            set.get(&Address([0xE2; 20])),
            Err(ChannelError::UnknownInterpreter(_))
        ));
    }

    #[test]
    fn bindings_rebuild_the_set() {
        let set = InterpreterSet::with_bidirectional(Address([0xE1; 20]));
        let bindings = set.bindings();
        assert_eq!(
            bindings,
            vec![(Address([0xE1; 20]), BidirectionalPayment::template_hash())]
        );
        let rebuilt = InterpreterSet::from_bindings(&bindings).unwrap();
        assert_eq!(rebuilt.bindings(), bindings);
    }

    #[test]
    fn unknown_code_hash_rejected() {
        let bindings = [(Address([0xE1; 20]), keccak256(b"mystery"))];
        assert!(matches!(
            InterpreterSet::from_bindings(&bindings),
            Err(ChannelError::IdentityMismatch { .. })
        ));
    }
}
