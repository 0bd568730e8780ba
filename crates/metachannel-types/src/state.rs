//! Meta-channel and sub-channel state tuples.
//!
//! These are the values the two parties sign off-chain. Field order here
//! *is* the canonical encoding order; reordering a field is a wire break.
//!
//! ```text
//!   MetaChannelState (8 words)          SubChannelState (13 words)
//!   ├─ is_closed                        ├─ is_closed
//!   ├─ sequence                         ├─ is_force_push
//!   ├─ party_a                          ├─ sequence
//!   ├─ party_b                          ├─ timeout_secs
//!   ├─ metachannel_address              ├─ interpreter_address
//!   ├─ subchannel_root ◀── tree root ── ├─ channel_id
//!   ├─ balance_a           over hash()  ├─ metachannel_address
//!   └─ balance_b           of each ───▶ ├─ registry_address
//!                                       ├─ tx_root
//!                                       ├─ party_a, party_b
//!                                       └─ balance_a, balance_b
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Address, Amount, ChannelId, H256, Result, Signature,
    codec::{CanonicalState, Decoder, Encoder},
    constants,
};

/// A state signed by both parties of a channel.
pub trait TwoPartyState: CanonicalState {
    fn party_a(&self) -> Address;
    fn party_b(&self) -> Address;
    fn sequence(&self) -> u64;
    fn balances(&self) -> (Amount, Amount);

    /// `balance_a + balance_b`, checked.
    fn total(&self) -> Result<Amount> {
        let (a, b) = self.balances();
        a.checked_add(b)
    }
}

// ---------------------------------------------------------------------------
// MetaChannelState
// ---------------------------------------------------------------------------

/// Top-level state of a meta-channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaChannelState {
    pub is_closed: bool,
    /// Strictly increases across every jointly signed meta-state.
    pub sequence: u64,
    pub party_a: Address,
    pub party_b: Address,
    /// Counterfactual address of the meta-channel settlement contract.
    pub metachannel_address: Address,
    /// Commitment tree root over the active sub-channel state hashes.
    pub subchannel_root: H256,
    pub balance_a: Amount,
    pub balance_b: Amount,
}

impl MetaChannelState {
    /// The sequence-0 state both parties sign before depositing.
    #[must_use]
    pub fn genesis(
        party_a: Address,
        party_b: Address,
        metachannel_address: Address,
        balance_a: Amount,
        balance_b: Amount,
    ) -> Self {
        Self {
            is_closed: false,
            sequence: 0,
            party_a,
            party_b,
            metachannel_address,
            subchannel_root: H256::zero(),
            balance_a,
            balance_b,
        }
    }

    /// The successor state with a new root and top-level balances.
    #[must_use]
    pub fn successor(&self, subchannel_root: H256, balance_a: Amount, balance_b: Amount) -> Self {
        Self {
            sequence: self.sequence + 1,
            subchannel_root,
            balance_a,
            balance_b,
            ..self.clone()
        }
    }
}

impl CanonicalState for MetaChannelState {
    const FIELD_COUNT: usize = constants::META_STATE_FIELDS;

    fn encode(&self) -> Vec<u8> {
        Encoder::with_fields(Self::FIELD_COUNT)
            .bool(self.is_closed)
            .u64(self.sequence)
            .address(&self.party_a)
            .address(&self.party_b)
            .address(&self.metachannel_address)
            .h256(&self.subchannel_root)
            .amount(self.balance_a)
            .amount(self.balance_b)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(bytes, Self::FIELD_COUNT)?;
        let state = Self {
            is_closed: d.bool("is_closed")?,
            sequence: d.u64("sequence")?,
            party_a: d.address("party_a")?,
            party_b: d.address("party_b")?,
            metachannel_address: d.address("metachannel_address")?,
            subchannel_root: d.h256("subchannel_root")?,
            balance_a: d.amount("balance_a")?,
            balance_b: d.amount("balance_b")?,
        };
        d.finish()?;
        Ok(state)
    }
}

impl TwoPartyState for MetaChannelState {
    fn party_a(&self) -> Address {
        self.party_a
    }

    fn party_b(&self) -> Address {
        self.party_b
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn balances(&self) -> (Amount, Amount) {
        (self.balance_a, self.balance_b)
    }
}

// ---------------------------------------------------------------------------
// SubChannelState
// ---------------------------------------------------------------------------

/// State of one sub-channel nested under a meta-channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChannelState {
    /// Closed cooperatively off-chain; balances already folded into the meta-state.
    pub is_closed: bool,
    /// Both parties opted in to the unilateral force-push escape hatch.
    pub is_force_push: bool,
    /// Monotonic per `channel_id`.
    pub sequence: u64,
    /// Challenge window opened by a dispute on this state, in whole seconds.
    pub timeout_secs: u64,
    /// Interpreter validating transitions (e.g. bidirectional payments).
    pub interpreter_address: Address,
    pub channel_id: ChannelId,
    pub metachannel_address: Address,
    pub registry_address: Address,
    /// Root over the sub-channel's own transactions, opaque to settlement.
    pub tx_root: H256,
    pub party_a: Address,
    pub party_b: Address,
    pub balance_a: Amount,
    pub balance_b: Amount,
}

impl SubChannelState {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Same sub-channel, next sequence, new balances.
    #[must_use]
    pub fn with_payment(&self, balance_a: Amount, balance_b: Amount) -> Self {
        Self {
            sequence: self.sequence + 1,
            balance_a,
            balance_b,
            ..self.clone()
        }
    }
}

impl CanonicalState for SubChannelState {
    const FIELD_COUNT: usize = constants::SUB_STATE_FIELDS;

    fn encode(&self) -> Vec<u8> {
        Encoder::with_fields(Self::FIELD_COUNT)
            .bool(self.is_closed)
            .bool(self.is_force_push)
            .u64(self.sequence)
            .u64(self.timeout_secs)
            .address(&self.interpreter_address)
            .h256(&self.channel_id.0)
            .address(&self.metachannel_address)
            .address(&self.registry_address)
            .h256(&self.tx_root)
            .address(&self.party_a)
            .address(&self.party_b)
            .amount(self.balance_a)
            .amount(self.balance_b)
            .finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(bytes, Self::FIELD_COUNT)?;
        let state = Self {
            is_closed: d.bool("is_closed")?,
            is_force_push: d.bool("is_force_push")?,
            sequence: d.u64("sequence")?,
            timeout_secs: d.u64("timeout_secs")?,
            interpreter_address: d.address("interpreter_address")?,
            channel_id: ChannelId(d.h256("channel_id")?),
            metachannel_address: d.address("metachannel_address")?,
            registry_address: d.address("registry_address")?,
            tx_root: d.h256("tx_root")?,
            party_a: d.address("party_a")?,
            party_b: d.address("party_b")?,
            balance_a: d.amount("balance_a")?,
            balance_b: d.amount("balance_b")?,
        };
        d.finish()?;
        Ok(state)
    }
}

impl TwoPartyState for SubChannelState {
    fn party_a(&self) -> Address {
        self.party_a
    }

    fn party_b(&self) -> Address {
        self.party_b
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn balances(&self) -> (Amount, Amount) {
        (self.balance_a, self.balance_b)
    }
}

// ---------------------------------------------------------------------------
// SignedState
// ---------------------------------------------------------------------------

/// A `(state, sig_a, sig_b)` triple.
///
/// Holding one proves nothing by itself; signatures are checked by
/// `metachannel_core::authority::verify_signed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedState<S> {
    pub state: S,
    pub sig_a: Signature,
    pub sig_b: Signature,
}

impl<S: TwoPartyState> SignedState<S> {
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.state.sequence()
    }

    /// Hash both signatures commit to.
    #[must_use]
    pub fn message_hash(&self) -> H256 {
        self.state.hash()
    }
}

/// Dummy states for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl SubChannelState {
    /// A bidirectional payment sub-channel with zero timeout.
    pub fn dummy(
        channel_id: ChannelId,
        party_a: Address,
        party_b: Address,
        metachannel_address: Address,
        balance_a: Amount,
        balance_b: Amount,
    ) -> Self {
        Self {
            is_closed: false,
            is_force_push: false,
            sequence: 0,
            timeout_secs: 0,
            interpreter_address: Address([0xE1; 20]),
            channel_id,
            metachannel_address,
            registry_address: Address([0xEE; 20]),
            tx_root: H256::zero(),
            party_a,
            party_b,
            balance_a,
            balance_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelError;

    fn meta() -> MetaChannelState {
        MetaChannelState::genesis(
            Address([1; 20]),
            Address([2; 20]),
            Address([3; 20]),
            Amount::ether(10),
            Amount::ether(20),
        )
    }

    fn sub() -> SubChannelState {
        SubChannelState::dummy(
            ChannelId::from_salt("salt1"),
            Address([1; 20]),
            Address([2; 20]),
            Address([3; 20]),
            Amount::ZERO,
            Amount::ether(10),
        )
    }

    #[test]
    fn meta_state_encoding_is_eight_words() {
        assert_eq!(meta().encode().len(), 8 * constants::WORD_SIZE);
    }

    #[test]
    fn sub_state_encoding_is_thirteen_words() {
        assert_eq!(sub().encode().len(), 13 * constants::WORD_SIZE);
    }

    #[test]
    fn meta_state_decode_inverts_encode() {
        let state = meta().successor(H256([7; 32]), Amount::ether(5), Amount::ether(10));
        assert_eq!(MetaChannelState::decode(&state.encode()).unwrap(), state);
    }

    #[test]
    fn sub_state_decode_inverts_encode() {
        let mut state = sub().with_payment(Amount::ether(1), Amount::ether(9));
        state.is_force_push = true;
        state.timeout_secs = 3_600;
        assert_eq!(SubChannelState::decode(&state.encode()).unwrap(), state);
    }

    #[test]
    fn meta_bytes_do_not_decode_as_sub_state() {
        let err = SubChannelState::decode(&meta().encode()).unwrap_err();
        assert!(matches!(err, ChannelError::MalformedState { .. }));
    }

    #[test]
    fn truncated_sub_state_rejected() {
        let bytes = sub().encode();
        assert!(SubChannelState::decode(&bytes[..bytes.len() - 32]).is_err());
    }

    #[test]
    fn every_field_changes_the_hash() {
        let base = meta();
        let variants = [
            MetaChannelState { is_closed: true, ..base.clone() },
            MetaChannelState { sequence: 1, ..base.clone() },
            MetaChannelState { party_a: Address([9; 20]), ..base.clone() },
            MetaChannelState { party_b: Address([9; 20]), ..base.clone() },
            MetaChannelState { metachannel_address: Address([9; 20]), ..base.clone() },
            MetaChannelState { subchannel_root: H256([9; 32]), ..base.clone() },
            MetaChannelState { balance_a: Amount::ether(11), ..base.clone() },
            MetaChannelState { balance_b: Amount::ether(19), ..base.clone() },
        ];
        for v in &variants {
            assert_ne!(v.hash(), base.hash(), "{v:?}");
        }
    }

    #[test]
    fn successor_bumps_sequence_only_where_expected() {
        let s0 = meta();
        let s1 = s0.successor(H256([1; 32]), Amount::ether(10), Amount::ether(10));
        assert_eq!(s1.sequence, 1);
        assert_eq!(s1.party_a, s0.party_a);
        assert_eq!(s1.metachannel_address, s0.metachannel_address);
    }

    #[test]
    fn totals_are_checked() {
        assert_eq!(meta().total().unwrap(), Amount::ether(30));
        let mut overflow = meta();
        overflow.balance_a = Amount(u128::MAX);
        assert!(overflow.total().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let state = sub();
        let json = serde_json::to_string(&state).unwrap();
        let back: SubChannelState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
