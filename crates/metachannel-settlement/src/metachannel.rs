//! The meta-channel settlement contract.
//!
//! One [`MetaChannel`] is the deployed, on-chain half of one meta-channel.
//! It never holds value; it only decides which co-signed state is final:
//!
//! 1. A party disputes a sub-channel with the latest co-signed meta-state,
//!    an inclusion proof, and the sub-channel state
//!    ([`MetaChannel::start_settle_state_subchannel`]).
//! 2. The counterparty may answer with any higher-sequence state until the
//!    deadline; each answer restarts the clock. A co-signed `is_closed`
//!    answer ends the dispute at once.
//! 3. After the deadline anyone closes the sub-channel
//!    ([`MetaChannel::close_with_timeout_subchannel`]).
//! 4. Once every committed sub-channel is closed (on-chain, or
//!    cooperatively via `is_closed`), the meta-state itself is disputed
//!    ([`MetaChannel::start_settle`]) and later closed
//!    ([`MetaChannel::close_with_timeout`]).
//!
//! Every entry point validates completely before writing anything.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use metachannel_core::{
    InclusionProof,
    authority::{recover, verify_signed_by},
    merkle,
};
use metachannel_types::{
    Address, Amount, CanonicalState, ChannelError, ChannelId, EngineConfig, H256,
    MetaChannelPhase, MetaChannelState, Result, Signature, SignedState, SubChannelPhase,
    SubChannelState, TwoPartyState,
};
use serde::{Deserialize, Serialize};

use crate::interpreter::InterpreterSet;

// ---------------------------------------------------------------------------
// Records & outcomes
// ---------------------------------------------------------------------------

/// On-chain record of one disputed sub-channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChannelRecord {
    pub channel_id: ChannelId,
    pub phase: SubChannelPhase,
    pub sequence: u64,
    /// Last accepted state (jointly signed, or force-pushed).
    pub state: SubChannelState,
    /// Hash of the last jointly signed state, proven under a meta root.
    pub committed_hash: H256,
    /// Sequence of the last jointly signed state. Joint answers must beat
    /// this, not a force-pushed sequence.
    pub joint_sequence: u64,
    pub dispute_opened_at: DateTime<Utc>,
    pub last_submission_at: DateTime<Utc>,
    /// Party behind the last accepted submission.
    pub last_submitter: Address,
    pub deadline: DateTime<Utc>,
    /// Set by a force-push; cleared by the next jointly signed answer.
    pub pushed_by: Option<Address>,
    pub final_balances: Option<(Amount, Amount)>,
}

/// On-chain record of the meta-channel dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaChannelRecord {
    pub phase: MetaChannelPhase,
    /// Sequence of the disputed meta-state; `None` while `Open`.
    pub sequence: Option<u64>,
    pub state: Option<MetaChannelState>,
    pub deadline: Option<DateTime<Utc>>,
    pub final_balances: Option<(Amount, Amount)>,
    /// Highest meta sequence carried by any sub-channel dispute.
    pub highest_sequence_seen: u64,
}

impl Default for MetaChannelRecord {
    fn default() -> Self {
        Self {
            phase: MetaChannelPhase::Open,
            sequence: None,
            state: None,
            deadline: None,
            final_balances: None,
            highest_sequence_seen: 0,
        }
    }
}

/// Final balances of a closed sub-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChannelOutcome {
    pub channel_id: ChannelId,
    pub sequence: u64,
    pub party_a: Address,
    pub party_b: Address,
    pub balance_a: Amount,
    pub balance_b: Amount,
}

impl SubChannelOutcome {
    pub fn total(&self) -> Result<Amount> {
        self.balance_a.checked_add(self.balance_b)
    }
}

/// Final top-level balances of a closed meta-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaChannelOutcome {
    pub sequence: u64,
    pub party_a: Address,
    pub party_b: Address,
    pub balance_a: Amount,
    pub balance_b: Amount,
}

impl MetaChannelOutcome {
    pub fn total(&self) -> Result<Amount> {
        self.balance_a.checked_add(self.balance_b)
    }
}

// ---------------------------------------------------------------------------
// MetaChannel
// ---------------------------------------------------------------------------

/// Settlement contract for one meta-channel.
#[derive(Debug, Clone)]
pub struct MetaChannel {
    address: Address,
    registry: Address,
    party_a: Address,
    party_b: Address,
    config: EngineConfig,
    interpreters: InterpreterSet,
    subchannels: BTreeMap<ChannelId, SubChannelRecord>,
    meta: MetaChannelRecord,
}

impl MetaChannel {
    pub fn new(
        address: Address,
        registry: Address,
        party_a: Address,
        party_b: Address,
        config: EngineConfig,
        interpreters: InterpreterSet,
    ) -> Result<Self> {
        config.validate()?;
        if party_a == party_b {
            return Err(ChannelError::invalid_state(
                "meta-channel parties must be distinct",
            ));
        }
        Ok(Self {
            address,
            registry,
            party_a,
            party_b,
            config,
            interpreters,
            subchannels: BTreeMap::new(),
            meta: MetaChannelRecord::default(),
        })
    }

    // -- queries ----------------------------------------------------------

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn registry(&self) -> Address {
        self.registry
    }

    #[must_use]
    pub fn parties(&self) -> (Address, Address) {
        (self.party_a, self.party_b)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn interpreters(&self) -> &InterpreterSet {
        &self.interpreters
    }

    #[must_use]
    pub fn subchannel(&self, channel_id: &ChannelId) -> Option<&SubChannelRecord> {
        self.subchannels.get(channel_id)
    }

    /// Every sub-channel that has ever been disputed.
    pub fn subchannels(&self) -> impl Iterator<Item = &SubChannelRecord> {
        self.subchannels.values()
    }

    #[must_use]
    pub fn metachannel(&self) -> &MetaChannelRecord {
        &self.meta
    }

    /// Outcomes of every closed sub-channel, ordered by channel id.
    #[must_use]
    pub fn finalized_subchannels(&self) -> Vec<SubChannelOutcome> {
        self.subchannels
            .values()
            .filter_map(|record| {
                record.final_balances.map(|(balance_a, balance_b)| SubChannelOutcome {
                    channel_id: record.channel_id,
                    sequence: record.sequence,
                    party_a: self.party_a,
                    party_b: self.party_b,
                    balance_a,
                    balance_b,
                })
            })
            .collect()
    }

    /// Outcome of the meta-channel once closed.
    #[must_use]
    pub fn meta_outcome(&self) -> Option<MetaChannelOutcome> {
        let (balance_a, balance_b) = self.meta.final_balances?;
        Some(MetaChannelOutcome {
            sequence: self.meta.sequence?,
            party_a: self.party_a,
            party_b: self.party_b,
            balance_a,
            balance_b,
        })
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.meta.phase == MetaChannelPhase::Closed
    }

    // -- shared validation ------------------------------------------------

    /// Sub-channel disputes run only while the meta-channel is `Open`.
    fn ensure_meta_open(&self) -> Result<()> {
        match self.meta.phase {
            MetaChannelPhase::Open => Ok(()),
            MetaChannelPhase::Disputed => Err(ChannelError::invalid_state(
                "meta-channel is being settled; sub-channel disputes are closed",
            )),
            MetaChannelPhase::Closed => Err(ChannelError::TimeoutExpired {
                deadline: self.meta.deadline.unwrap_or(DateTime::<Utc>::MIN_UTC),
            }),
        }
    }

    /// Joint signature plus address binding of a submitted meta-state.
    fn check_signed_meta(&self, signed_meta: &SignedState<MetaChannelState>) -> Result<()> {
        verify_signed_by(signed_meta, self.party_a, self.party_b)?;
        if signed_meta.state.metachannel_address != self.address {
            return Err(ChannelError::invalid_state(format!(
                "meta-state names {}, this meta-channel is {}",
                signed_meta.state.metachannel_address, self.address
            )));
        }
        Ok(())
    }

    fn check_inclusion(
        &self,
        signed_meta: &SignedState<MetaChannelState>,
        leaf: &H256,
        proof: &InclusionProof,
    ) -> Result<()> {
        if merkle::verify(&signed_meta.state.subchannel_root, leaf, proof) {
            return Ok(());
        }
        tracing::warn!(
            metachannel = %self.address,
            meta_sequence = signed_meta.state.sequence,
            leaf = %leaf,
            "Inclusion proof rejected"
        );
        Err(ChannelError::proof_mismatch(format!(
            "{leaf} is not committed under root {}",
            signed_meta.state.subchannel_root
        )))
    }

    /// Sub-state must belong to this meta-channel and its parties.
    fn check_sub_binding(&self, sub_state: &SubChannelState) -> Result<()> {
        if sub_state.party_a != self.party_a || sub_state.party_b != self.party_b {
            return Err(ChannelError::invalid_state(
                "sub-channel names different parties",
            ));
        }
        if sub_state.metachannel_address != self.address {
            return Err(ChannelError::invalid_state(
                "sub-channel names a different meta-channel",
            ));
        }
        if sub_state.registry_address != self.registry {
            return Err(ChannelError::invalid_state(
                "sub-channel names a different registry",
            ));
        }
        Ok(())
    }

    fn ensure_party(&self, who: Address) -> Result<()> {
        if who == self.party_a || who == self.party_b {
            Ok(())
        } else {
            Err(ChannelError::UnauthorizedSigner { signer: who })
        }
    }

    /// `now + timeout`, saturating at the end of the clock.
    fn sub_deadline(now: DateTime<Utc>, sub_state: &SubChannelState) -> DateTime<Utc> {
        chrono::Duration::from_std(sub_state.timeout())
            .ok()
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn record_mut(&mut self, channel_id: &ChannelId) -> Result<&mut SubChannelRecord> {
        self.subchannels
            .get_mut(channel_id)
            .ok_or(ChannelError::UnknownSubChannel(*channel_id))
    }

    // -- sub-channel disputes ---------------------------------------------

    /// Open or answer a sub-channel dispute on behalf of `submitter`.
    ///
    /// An answer carrying `is_closed` closes the sub-channel immediately;
    /// such a state can never open a dispute.
    pub fn start_settle_state_subchannel(
        &mut self,
        proof: &InclusionProof,
        signed_meta: &SignedState<MetaChannelState>,
        sub_state: SubChannelState,
        submitter: Address,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_meta_open()?;
        self.ensure_party(submitter)?;
        self.check_signed_meta(signed_meta)?;
        let leaf = sub_state.hash();
        self.check_inclusion(signed_meta, &leaf, proof)?;
        self.check_sub_binding(&sub_state)?;
        let interpreter = self.interpreters.get(&sub_state.interpreter_address)?;

        let channel_id = sub_state.channel_id;
        let previous = self.subchannels.get(&channel_id);
        if let Some(record) = previous {
            if !record.phase.in_dispute() {
                return Err(ChannelError::invalid_state(format!(
                    "sub-channel {channel_id} is {}",
                    record.phase
                )));
            }
            if now >= record.deadline {
                return Err(ChannelError::TimeoutExpired {
                    deadline: record.deadline,
                });
            }
            if sub_state.sequence <= record.joint_sequence {
                tracing::warn!(
                    channel_id = %channel_id,
                    submitted = sub_state.sequence,
                    accepted = record.joint_sequence,
                    "Stale sub-channel state rejected"
                );
                return Err(ChannelError::StaleState {
                    submitted: sub_state.sequence,
                    accepted: record.joint_sequence,
                });
            }
            if sub_state.interpreter_address != record.state.interpreter_address {
                return Err(ChannelError::invalid_state(
                    "counter-submission changes the interpreter",
                ));
            }
            if record.phase == SubChannelPhase::Settling
                && sub_state.total()? != record.state.total()?
            {
                return Err(ChannelError::invalid_state(
                    "counter-submission changes the total already in custody",
                ));
            }
        } else if sub_state.is_closed {
            return Err(ChannelError::invalid_state(
                "cooperatively closed sub-channel cannot open a dispute",
            ));
        }
        interpreter.validate_transition(previous.map(|r| &r.state), &sub_state)?;
        let deadline = Self::sub_deadline(now, &sub_state);

        // -- validation complete; write --
        let sequence = sub_state.sequence;
        match self.subchannels.get_mut(&channel_id) {
            Some(record) => {
                let closes = sub_state.is_closed;
                let balances = sub_state.balances();
                record.sequence = sequence;
                record.joint_sequence = sequence;
                record.state = sub_state;
                record.committed_hash = leaf;
                record.last_submission_at = now;
                record.last_submitter = submitter;
                record.pushed_by = None;
                if closes {
                    record.phase = SubChannelPhase::Closed;
                    record.deadline = now;
                    record.final_balances = Some(balances);
                    tracing::info!(
                        channel_id = %channel_id,
                        sequence,
                        balance_a = %balances.0,
                        balance_b = %balances.1,
                        "Sub-channel closed cooperatively"
                    );
                } else {
                    record.deadline = deadline;
                    tracing::info!(
                        channel_id = %channel_id,
                        sequence,
                        deadline = %deadline,
                        "Sub-channel dispute answered"
                    );
                }
            }
            None => {
                self.subchannels.insert(
                    channel_id,
                    SubChannelRecord {
                        channel_id,
                        phase: SubChannelPhase::Disputed,
                        sequence,
                        state: sub_state,
                        committed_hash: leaf,
                        joint_sequence: sequence,
                        dispute_opened_at: now,
                        last_submission_at: now,
                        last_submitter: submitter,
                        deadline,
                        pushed_by: None,
                        final_balances: None,
                    },
                );
                tracing::info!(
                    channel_id = %channel_id,
                    sequence,
                    deadline = %deadline,
                    "Sub-channel dispute opened"
                );
            }
        }
        self.meta.highest_sequence_seen = self
            .meta
            .highest_sequence_seen
            .max(signed_meta.state.sequence);
        Ok(())
    }

    /// `Disputed → Settling`. Called by the escrow ledger once it has moved
    /// the sub-channel's total into custody.
    pub fn begin_settling(&mut self, channel_id: &ChannelId) -> Result<()> {
        let record = self.record_mut(channel_id)?;
        if !record.phase.can_transition_to(SubChannelPhase::Settling) {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel {channel_id} cannot settle from {}",
                record.phase
            )));
        }
        record.phase = SubChannelPhase::Settling;
        tracing::info!(channel_id = %channel_id, "Sub-channel settling");
        Ok(())
    }

    /// Fix the final balances of a sub-channel whose window has run out.
    pub fn close_with_timeout_subchannel(
        &mut self,
        channel_id: &ChannelId,
        now: DateTime<Utc>,
    ) -> Result<SubChannelOutcome> {
        let (party_a, party_b) = self.parties();
        let record = self.record_mut(channel_id)?;
        if !record.phase.in_dispute() {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel {channel_id} is {}",
                record.phase
            )));
        }
        if now < record.deadline {
            return Err(ChannelError::TimeoutNotElapsed {
                deadline: record.deadline,
            });
        }
        let balances = record.state.balances();
        record.phase = SubChannelPhase::Closed;
        record.final_balances = Some(balances);
        tracing::info!(
            channel_id = %channel_id,
            sequence = record.sequence,
            balance_a = %balances.0,
            balance_b = %balances.1,
            "Sub-channel closed"
        );
        Ok(SubChannelOutcome {
            channel_id: *channel_id,
            sequence: record.sequence,
            party_a,
            party_b,
            balance_a: balances.0,
            balance_b: balances.1,
        })
    }

    /// Unilateral escape hatch for a sub-channel both parties opted into.
    ///
    /// `signed_meta` and `proof` re-anchor the sub-channel to its last
    /// jointly signed state. `sub_state` is signed by one party only
    /// (`pusher_sig`), who must not have made the last submission: a push
    /// answers the counterparty's silence. The pushed sequence is exactly
    /// one above the recorded one, and a later joint answer only has to
    /// beat the last jointly signed sequence.
    pub fn force_push_subchannel(
        &mut self,
        signed_meta: &SignedState<MetaChannelState>,
        proof: &InclusionProof,
        sub_state: SubChannelState,
        pusher_sig: &Signature,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_meta_open()?;
        let channel_id = sub_state.channel_id;
        let record = self
            .subchannels
            .get(&channel_id)
            .ok_or(ChannelError::UnknownSubChannel(channel_id))?;
        if !record.phase.in_dispute() {
            return Err(ChannelError::invalid_state(format!(
                "sub-channel {channel_id} is {}",
                record.phase
            )));
        }
        if now >= record.deadline {
            return Err(ChannelError::TimeoutExpired {
                deadline: record.deadline,
            });
        }
        if !record.state.is_force_push {
            return Err(ChannelError::ForcePushRejected {
                reason: "recorded state did not opt into force-push".into(),
            });
        }
        let quiet_since = record.last_submission_at;
        let open_at = quiet_since
            .checked_add_signed(self.config.force_push_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if now < open_at {
            return Err(ChannelError::ForcePushRejected {
                reason: format!("response window runs until {open_at}"),
            });
        }

        self.check_signed_meta(signed_meta)?;
        if signed_meta.state.sequence < self.meta.highest_sequence_seen {
            return Err(ChannelError::StaleState {
                submitted: signed_meta.state.sequence,
                accepted: self.meta.highest_sequence_seen,
            });
        }
        self.check_inclusion(signed_meta, &record.committed_hash, proof)?;

        if sub_state.sequence <= record.sequence {
            return Err(ChannelError::StaleState {
                submitted: sub_state.sequence,
                accepted: record.sequence,
            });
        }
        if record.sequence.checked_add(1) != Some(sub_state.sequence) {
            return Err(ChannelError::ForcePushRejected {
                reason: format!(
                    "pushed sequence {} must follow {} directly",
                    sub_state.sequence, record.sequence
                ),
            });
        }
        let prev = &record.state;
        let identity_kept = sub_state.channel_id == prev.channel_id
            && sub_state.party_a == prev.party_a
            && sub_state.party_b == prev.party_b
            && sub_state.metachannel_address == prev.metachannel_address
            && sub_state.registry_address == prev.registry_address
            && sub_state.interpreter_address == prev.interpreter_address
            && sub_state.timeout_secs == prev.timeout_secs
            && sub_state.is_force_push
            && !sub_state.is_closed;
        if !identity_kept {
            return Err(ChannelError::ForcePushRejected {
                reason: "pushed state changes identity fields".into(),
            });
        }
        if sub_state.total()? != prev.total()? {
            return Err(ChannelError::ForcePushRejected {
                reason: "pushed state does not conserve the sub-channel total".into(),
            });
        }
        let pusher = recover(&sub_state.hash(), pusher_sig)?;
        if pusher != self.party_a && pusher != self.party_b {
            tracing::warn!(
                channel_id = %channel_id,
                signer = %pusher,
                "Force-push signed by a non-party"
            );
            return Err(ChannelError::ForcePushRejected {
                reason: format!("signer {pusher} is not a party"),
            });
        }
        if pusher == record.last_submitter {
            tracing::warn!(
                channel_id = %channel_id,
                pusher = %pusher,
                "Force-push over own submission"
            );
            return Err(ChannelError::ForcePushRejected {
                reason: format!(
                    "{pusher} made the last submission; the counterparty has not been silent"
                ),
            });
        }
        self.interpreters
            .get(&sub_state.interpreter_address)?
            .validate_transition(Some(prev), &sub_state)?;
        let deadline = Self::sub_deadline(now, &sub_state);

        // -- validation complete; write --
        let record = self.record_mut(&channel_id)?;
        record.sequence = sub_state.sequence;
        record.state = sub_state;
        record.last_submission_at = now;
        record.last_submitter = pusher;
        record.deadline = deadline;
        record.pushed_by = Some(pusher);
        tracing::info!(
            channel_id = %channel_id,
            sequence = record.sequence,
            pusher = %pusher,
            deadline = %deadline,
            "Sub-channel force-pushed"
        );
        Ok(())
    }

    // -- meta-channel settlement ------------------------------------------

    /// Open or answer the meta-channel dispute.
    ///
    /// `committed_subchannels` are the sub-states `signed_meta` commits to,
    /// in leaf order. Each must already be closed on-chain or carry
    /// `is_closed`.
    pub fn start_settle(
        &mut self,
        signed_meta: &SignedState<MetaChannelState>,
        committed_subchannels: &[SubChannelState],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let submitted = signed_meta.state.sequence;
        match self.meta.phase {
            MetaChannelPhase::Closed => {
                return Err(ChannelError::TimeoutExpired {
                    deadline: self.meta.deadline.unwrap_or(DateTime::<Utc>::MIN_UTC),
                });
            }
            MetaChannelPhase::Disputed => {
                if let Some(deadline) = self.meta.deadline.filter(|d| now >= *d) {
                    return Err(ChannelError::TimeoutExpired { deadline });
                }
                if let Some(accepted) = self.meta.sequence.filter(|s| submitted <= *s) {
                    tracing::warn!(submitted, accepted, "Stale meta-state rejected");
                    return Err(ChannelError::StaleState {
                        submitted,
                        accepted,
                    });
                }
            }
            MetaChannelPhase::Open => {}
        }
        self.check_signed_meta(signed_meta)?;
        if submitted < self.meta.highest_sequence_seen {
            tracing::warn!(
                submitted,
                highest_seen = self.meta.highest_sequence_seen,
                "Meta-state older than a sub-channel dispute"
            );
            return Err(ChannelError::StaleState {
                submitted,
                accepted: self.meta.highest_sequence_seen,
            });
        }
        if committed_subchannels.len() > self.config.max_subchannels {
            return Err(ChannelError::invalid_state(format!(
                "{} committed sub-channels exceed the limit of {}",
                committed_subchannels.len(),
                self.config.max_subchannels
            )));
        }
        let root = merkle::subchannel_root(committed_subchannels);
        if root != signed_meta.state.subchannel_root {
            tracing::warn!(
                sequence = submitted,
                root = %root,
                "Committed sub-channels do not rebuild the meta root"
            );
            return Err(ChannelError::proof_mismatch(format!(
                "committed sub-channels rebuild {root}, meta-state commits to {}",
                signed_meta.state.subchannel_root
            )));
        }
        for sub in committed_subchannels {
            if sub.is_closed {
                continue;
            }
            let closed = self
                .subchannels
                .get(&sub.channel_id)
                .is_some_and(|r| r.phase == SubChannelPhase::Closed);
            if !closed {
                return Err(ChannelError::invalid_state(format!(
                    "committed sub-channel {} is still open",
                    sub.channel_id
                )));
            }
        }
        let deadline = now
            .checked_add_signed(self.config.meta_window())
            .ok_or_else(|| ChannelError::invalid_state("meta window overflows the clock"))?;

        // -- validation complete; write --
        let opening = self.meta.phase == MetaChannelPhase::Open;
        self.meta.phase = MetaChannelPhase::Disputed;
        self.meta.sequence = Some(submitted);
        self.meta.state = Some(signed_meta.state.clone());
        self.meta.deadline = Some(deadline);
        tracing::info!(
            metachannel = %self.address,
            sequence = submitted,
            deadline = %deadline,
            opening,
            "Meta-channel dispute recorded"
        );
        Ok(())
    }

    /// Fix the final top-level balances once the meta window has run out.
    pub fn close_with_timeout(&mut self, now: DateTime<Utc>) -> Result<MetaChannelOutcome> {
        if self.meta.phase != MetaChannelPhase::Disputed {
            return Err(ChannelError::invalid_state(format!(
                "meta-channel is {}",
                self.meta.phase
            )));
        }
        let (Some(deadline), Some(state), Some(sequence)) =
            (self.meta.deadline, self.meta.state.as_ref(), self.meta.sequence)
        else {
            return Err(ChannelError::Internal(
                "disputed meta-channel without a recorded state".into(),
            ));
        };
        if now < deadline {
            return Err(ChannelError::TimeoutNotElapsed { deadline });
        }
        let (balance_a, balance_b) = state.balances();
        self.meta.phase = MetaChannelPhase::Closed;
        self.meta.final_balances = Some((balance_a, balance_b));
        tracing::info!(
            metachannel = %self.address,
            sequence,
            balance_a = %balance_a,
            balance_b = %balance_b,
            "Meta-channel closed"
        );
        Ok(MetaChannelOutcome {
            sequence,
            party_a: self.party_a,
            party_b: self.party_b,
            balance_a,
            balance_b,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
