//! Off-chain channel session.
//!
//! Each party keeps its own `ChannelSession`: the latest jointly signed
//! meta-state plus the latest jointly signed state of every sub-channel the
//! meta-state commits to. Nothing is shared between the two copies; each
//! side verifies the counterparty's signatures before accepting anything.
//!
//! Updates arrive in two steps. A sub-channel update is accepted into the
//! working set first; the meta-state that commits to the new set is
//! accepted after, and only if its `subchannel_root` matches the root the
//! session computes over that set.

use metachannel_types::{
    Address, ChannelError, ChannelId, EngineConfig, H256, MetaChannelState, Result, SignedState,
    SubChannelState,
};

use crate::{
    authority::verify_signed_by,
    merkle::{CommitmentTree, InclusionProof},
};

#[derive(Debug, Clone)]
pub struct ChannelSession {
    party_a: Address,
    party_b: Address,
    metachannel_address: Address,
    max_subchannels: usize,
    meta: SignedState<MetaChannelState>,
    /// Leaf order of the commitment tree.
    subchannels: Vec<SignedState<SubChannelState>>,
}

impl ChannelSession {
    /// Start from the jointly signed sequence-0 meta-state.
    pub fn new(genesis: SignedState<MetaChannelState>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let state = &genesis.state;
        if state.sequence != 0 || state.is_closed || !state.subchannel_root.is_zero() {
            return Err(ChannelError::invalid_state(
                "genesis must be sequence 0, open, with an empty sub-channel root",
            ));
        }
        verify_signed_by(&genesis, state.party_a, state.party_b)?;
        Ok(Self {
            party_a: state.party_a,
            party_b: state.party_b,
            metachannel_address: state.metachannel_address,
            max_subchannels: config.max_subchannels,
            meta: genesis,
            subchannels: Vec::new(),
        })
    }

    #[must_use]
    pub fn parties(&self) -> (Address, Address) {
        (self.party_a, self.party_b)
    }

    #[must_use]
    pub fn metachannel_address(&self) -> Address {
        self.metachannel_address
    }

    #[must_use]
    pub fn latest_meta(&self) -> &SignedState<MetaChannelState> {
        &self.meta
    }

    #[must_use]
    pub fn subchannel(&self, channel_id: &ChannelId) -> Option<&SignedState<SubChannelState>> {
        self.subchannels
            .iter()
            .find(|s| s.state.channel_id == *channel_id)
    }

    /// Sub-channel states in commitment order.
    #[must_use]
    pub fn committed_states(&self) -> Vec<SubChannelState> {
        self.subchannels.iter().map(|s| s.state.clone()).collect()
    }

    #[must_use]
    pub fn tree(&self) -> CommitmentTree {
        CommitmentTree::from_states(&self.committed_states())
    }

    /// Root over the working sub-channel set.
    #[must_use]
    pub fn root(&self) -> H256 {
        self.tree().root()
    }

    /// `true` once the latest meta-state commits to the working set.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.meta.state.subchannel_root == self.root()
    }

    /// Inclusion proof for the latest state of `channel_id`.
    pub fn proof_for(&self, channel_id: &ChannelId) -> Result<InclusionProof> {
        let signed = self
            .subchannel(channel_id)
            .ok_or(ChannelError::UnknownSubChannel(*channel_id))?;
        self.tree().proof_for(&signed.message_hash())
    }

    /// Accept a co-signed sub-channel state into the working set.
    ///
    /// A known `channel_id` must advance its sequence and keep its
    /// interpreter and registry; an unknown one is appended as a new leaf.
    pub fn accept_subchannel_update(&mut self, signed: SignedState<SubChannelState>) -> Result<()> {
        verify_signed_by(&signed, self.party_a, self.party_b)?;
        let state = &signed.state;
        if state.metachannel_address != self.metachannel_address {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel names meta-channel {}, session is {}",
                state.metachannel_address, self.metachannel_address
            )));
        }

        let channel_id = state.channel_id;
        if let Some(slot) = self
            .subchannels
            .iter_mut()
            .find(|s| s.state.channel_id == channel_id)
        {
            if state.sequence <= slot.state.sequence {
                tracing::warn!(
                    channel_id = %channel_id,
                    submitted = state.sequence,
                    accepted = slot.state.sequence,
                    "Stale sub-channel update rejected"
                );
                return Err(ChannelError::StaleState {
                    submitted: state.sequence,
                    accepted: slot.state.sequence,
                });
            }
            if state.interpreter_address != slot.state.interpreter_address
                || state.registry_address != slot.state.registry_address
            {
                return Err(ChannelError::invalid_state(
                    "sub-channel update changes interpreter or registry",
                ));
            }
            tracing::debug!(
                channel_id = %channel_id,
                sequence = state.sequence,
                "Sub-channel update accepted"
            );
            *slot = signed;
            return Ok(());
        }

        if self.subchannels.len() >= self.max_subchannels {
            return Err(ChannelError::invalid_state(format!(
                "meta-channel already commits to {} sub-channels",
                self.subchannels.len()
            )));
        }
        tracing::debug!(
            channel_id = %channel_id,
            sequence = state.sequence,
            "Sub-channel opened"
        );
        self.subchannels.push(signed);
        Ok(())
    }

    /// Accept a co-signed meta-state committing to the working set.
    pub fn accept_meta_update(&mut self, signed: SignedState<MetaChannelState>) -> Result<()> {
        verify_signed_by(&signed, self.party_a, self.party_b)?;
        let state = &signed.state;
        if state.metachannel_address != self.metachannel_address {
            return Err(ChannelError::invalid_state(
                "meta-state names a different meta-channel",
            ));
        }
        if state.sequence <= self.meta.state.sequence {
            tracing::warn!(
                submitted = state.sequence,
                accepted = self.meta.state.sequence,
                "Stale meta update rejected"
            );
            return Err(ChannelError::StaleState {
                submitted: state.sequence,
                accepted: self.meta.state.sequence,
            });
        }
        let expected = self.root();
        if state.subchannel_root != expected {
            tracing::warn!(
                sequence = state.sequence,
                root = %state.subchannel_root,
                expected = %expected,
                "Meta update root does not match sub-channel set"
            );
            return Err(ChannelError::proof_mismatch(format!(
                "meta-state root {} does not match session root {expected}",
                state.subchannel_root
            )));
        }
        tracing::debug!(sequence = state.sequence, "Meta update accepted");
        self.meta = signed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use metachannel_types::{Amount, CanonicalState};

    use super::*;
    use crate::authority::{PartyKey, sign, sign_state};

    struct Fixture {
        a: PartyKey,
        b: PartyKey,
        meta_addr: Address,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                a: PartyKey::from_label("alice").unwrap(),
                b: PartyKey::from_label("bob").unwrap(),
                meta_addr: Address([0x33; 20]),
            }
        }

        fn genesis(&self) -> MetaChannelState {
            MetaChannelState::genesis(
                self.a.address(),
                self.b.address(),
                self.meta_addr,
                Amount::ether(10),
                Amount::ether(20),
            )
        }

        fn sub(&self, salt: &str, a: u64, b: u64) -> SubChannelState {
            SubChannelState::dummy(
                ChannelId::from_salt(salt),
                self.a.address(),
                self.b.address(),
                self.meta_addr,
                Amount::ether(a),
                Amount::ether(b),
            )
        }

        fn signed<S: metachannel_types::TwoPartyState>(&self, s: S) -> SignedState<S> {
            sign_state(s, &self.a, &self.b).unwrap()
        }

        fn session(&self) -> ChannelSession {
            ChannelSession::new(self.signed(self.genesis()), &EngineConfig::default()).unwrap()
        }
    }

    #[test]
    fn genesis_must_be_sequence_zero() {
        let f = Fixture::new();
        let mut g = f.genesis();
        g.sequence = 1;
        assert!(ChannelSession::new(f.signed(g), &EngineConfig::default()).is_err());
        assert!(f.session().is_consistent());
    }

    #[test]
    fn open_subchannel_then_commit_meta() {
        let f = Fixture::new();
        let mut session = f.session();
        let sub = f.sub("salt1", 0, 10);
        session.accept_subchannel_update(f.signed(sub.clone())).unwrap();
        assert!(!session.is_consistent());

        let s1 = session.latest_meta().state.successor(
            session.root(),
            Amount::ether(10),
            Amount::ether(10),
        );
        session.accept_meta_update(f.signed(s1)).unwrap();
        assert!(session.is_consistent());
        assert_eq!(session.root(), sub.hash());

        let proof = session.proof_for(&sub.channel_id).unwrap();
        assert!(crate::merkle::verify(&session.root(), &sub.hash(), &proof));
    }

    #[test]
    fn meta_with_wrong_root_rejected() {
        let f = Fixture::new();
        let mut session = f.session();
        session
            .accept_subchannel_update(f.signed(f.sub("salt1", 0, 10)))
            .unwrap();
        let s1 = session.latest_meta().state.successor(
            H256([0xAA; 32]),
            Amount::ether(10),
            Amount::ether(10),
        );
        let err = session.accept_meta_update(f.signed(s1)).unwrap_err();
        assert!(matches!(err, ChannelError::ProofMismatch { .. }));
        assert_eq!(session.latest_meta().sequence(), 0);
    }

    #[test]
    fn stale_updates_rejected() {
        let f = Fixture::new();
        let mut session = f.session();
        let sub = f.sub("salt1", 0, 10);
        session.accept_subchannel_update(f.signed(sub.clone())).unwrap();
        let paid = sub.with_payment(Amount::ether(1), Amount::ether(9));
        session.accept_subchannel_update(f.signed(paid)).unwrap();

        let err = session.accept_subchannel_update(f.signed(sub)).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::StaleState {
                submitted: 0,
                accepted: 1
            }
        ));

        let same_seq = f.genesis();
        let err = session.accept_meta_update(f.signed(same_seq)).unwrap_err();
        assert!(matches!(err, ChannelError::StaleState { .. }));
    }

    #[test]
    fn one_sided_update_rejected() {
        let f = Fixture::new();
        let mut session = f.session();
        let sub = f.sub("salt1", 0, 10);
        let sig_a = sign(&f.a, &sub.hash()).unwrap();
        let forged = SignedState {
            state: sub,
            sig_a,
            sig_b: sig_a,
        };
        let err = session.accept_subchannel_update(forged).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidSignature { .. }));
        assert!(session.committed_states().is_empty());
    }

    #[test]
    fn foreign_metachannel_rejected() {
        let f = Fixture::new();
        let mut session = f.session();
        let mut sub = f.sub("salt1", 0, 10);
        sub.metachannel_address = Address([0x99; 20]);
        assert!(session.accept_subchannel_update(f.signed(sub)).is_err());
    }

    #[test]
    fn interpreter_cannot_change() {
        let f = Fixture::new();
        let mut session = f.session();
        let sub = f.sub("salt1", 0, 10);
        session.accept_subchannel_update(f.signed(sub.clone())).unwrap();
        let mut next = sub.with_payment(Amount::ether(1), Amount::ether(9));
        next.interpreter_address = Address([0x42; 20]);
        assert!(session.accept_subchannel_update(f.signed(next)).is_err());
    }

    #[test]
    fn subchannel_limit_enforced() {
        let f = Fixture::new();
        let config = EngineConfig {
            max_subchannels: 1,
            ..EngineConfig::default()
        };
        let mut session = ChannelSession::new(f.signed(f.genesis()), &config).unwrap();
        session
            .accept_subchannel_update(f.signed(f.sub("salt1", 0, 10)))
            .unwrap();
        assert!(
            session
                .accept_subchannel_update(f.signed(f.sub("salt2", 5, 0)))
                .is_err()
        );
    }

    #[test]
    fn unknown_subchannel_has_no_proof() {
        let f = Fixture::new();
        let err = f.session().proof_for(&ChannelId::from_salt("nope")).unwrap_err();
        assert!(matches!(err, ChannelError::UnknownSubChannel(_)));
    }
}
