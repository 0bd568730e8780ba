//! Shared harness: two parties, a funded agreement, and an off-chain
//! session that walks the standard two-sub-channel history.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use metachannel_core::{ChannelSession, CommitmentTree, InclusionProof, PartyKey, sign, sign_state};
use metachannel_escrow::{EscrowLedger, Registry, metachannel_identity};
use metachannel_settlement::{InterpreterSet, MetaChannel};
use metachannel_types::{
    Address, AgreementId, Amount, CanonicalState, ChannelId, CounterfactualIdentity,
    EngineConfig, MetaChannelState, SignedState, SubChannelState,
};

pub const REGISTRY: Address = Address([0xEE; 20]);
pub const INTERPRETER: Address = Address([0xE1; 20]);
pub const SUB_TIMEOUT_SECS: u64 = 3_600;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn after_sub_timeout() -> DateTime<Utc> {
    t0() + Duration::seconds(SUB_TIMEOUT_SECS as i64)
}

/// A co-signed meta-state and the sub-states it commits to.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: SignedState<MetaChannelState>,
    pub subs: Vec<SubChannelState>,
}

impl Snapshot {
    pub fn proof(&self, target: &SubChannelState) -> InclusionProof {
        CommitmentTree::from_states(&self.subs)
            .proof_for(&target.hash())
            .unwrap()
    }
}

pub struct Harness {
    pub a: PartyKey,
    pub b: PartyKey,
    pub config: EngineConfig,
    pub identity: CounterfactualIdentity,
    pub registry: Registry<MetaChannel>,
    pub ledger: EscrowLedger,
    pub agreement: AgreementId,
    pub session: ChannelSession,
    /// Every meta-state signed so far, `history[n]` has sequence `n`.
    pub history: Vec<Snapshot>,
}

impl Harness {
    /// Both parties fund 10 / 20 against the sequence-0 state.
    pub fn funded() -> Self {
        init_tracing();
        let a = PartyKey::from_label("alice").unwrap();
        let b = PartyKey::from_label("bob").unwrap();
        let config = EngineConfig::default();
        let identity = metachannel_identity(
            REGISTRY,
            a.address(),
            b.address(),
            &config,
            &InterpreterSet::with_bidirectional(INTERPRETER),
        )
        .unwrap();

        let s0 = MetaChannelState::genesis(
            a.address(),
            b.address(),
            identity.address(),
            Amount::ether(10),
            Amount::ether(20),
        );
        let bytes = s0.encode();
        let signed = sign_state(s0, &a, &b).unwrap();

        let mut ledger = EscrowLedger::new();
        let agreement = ledger
            .open_agreement(&bytes, INTERPRETER, &signed.sig_a, a.address(), Amount::ether(10))
            .unwrap();
        ledger
            .join_agreement(
                agreement,
                &bytes,
                INTERPRETER,
                &signed.sig_b,
                b.address(),
                Amount::ether(20),
            )
            .unwrap();

        let session = ChannelSession::new(signed.clone(), &config).unwrap();
        Self {
            a,
            b,
            config,
            identity,
            registry: Registry::new(REGISTRY),
            ledger,
            agreement,
            session,
            history: vec![Snapshot {
                meta: signed,
                subs: Vec::new(),
            }],
        }
    }

    pub fn metachannel_address(&self) -> Address {
        self.identity.address()
    }

    pub fn new_sub(&self, salt: &str, bal_a: u64, bal_b: u64) -> SubChannelState {
        SubChannelState {
            timeout_secs: SUB_TIMEOUT_SECS,
            registry_address: REGISTRY,
            interpreter_address: INTERPRETER,
            ..SubChannelState::dummy(
                ChannelId::from_salt(salt),
                self.a.address(),
                self.b.address(),
                self.metachannel_address(),
                Amount::ether(bal_a),
                Amount::ether(bal_b),
            )
        }
    }

    /// Co-sign `sub`, then a meta-state committing to the new set.
    pub fn update(&mut self, sub: SubChannelState, meta_a: u64, meta_b: u64) -> Snapshot {
        let signed_sub = sign_state(sub, &self.a, &self.b).unwrap();
        self.session.accept_subchannel_update(signed_sub).unwrap();
        let next = self.session.latest_meta().state.successor(
            self.session.root(),
            Amount::ether(meta_a),
            Amount::ether(meta_b),
        );
        let signed_meta = sign_state(next, &self.a, &self.b).unwrap();
        self.session.accept_meta_update(signed_meta.clone()).unwrap();
        let snapshot = Snapshot {
            meta: signed_meta,
            subs: self.session.committed_states(),
        };
        self.history.push(snapshot.clone());
        snapshot
    }

    /// s1..s4: sub1 opens at 0/10 and pays to 1/9, sub2 opens at 5/0 and
    /// pays to 2/3. Returns the latest states of sub1 and sub2.
    pub fn standard_history(&mut self) -> (SubChannelState, SubChannelState) {
        let sub1 = self.new_sub("salt1", 0, 10);
        self.update(sub1.clone(), 10, 10);
        let sub1 = sub1.with_payment(Amount::ether(1), Amount::ether(9));
        self.update(sub1.clone(), 10, 10);

        let sub2 = self.new_sub("salt2", 5, 0);
        self.update(sub2.clone(), 5, 10);
        let sub2 = sub2.with_payment(Amount::ether(2), Amount::ether(3));
        self.update(sub2.clone(), 5, 10);
        (sub1, sub2)
    }

    pub fn latest(&self) -> &Snapshot {
        self.history.last().unwrap()
    }

    pub fn deploy(&mut self) -> Address {
        let hash = self.identity.identity_hash();
        let sigs = [sign(&self.a, &hash).unwrap(), sign(&self.b, &hash).unwrap()];
        self.registry.deploy(&self.identity, &sigs).unwrap()
    }

    pub fn metachannel(&mut self) -> &mut MetaChannel {
        let ctf = self.metachannel_address();
        self.registry.get_mut(&ctf).unwrap()
    }

    /// Dispute `sub` as party A using the snapshot at meta sequence `seq`.
    pub fn dispute(
        &mut self,
        seq: usize,
        sub: &SubChannelState,
        now: DateTime<Utc>,
    ) -> metachannel_types::Result<()> {
        let submitter = self.a.address();
        self.dispute_as(submitter, seq, sub, now)
    }

    pub fn dispute_as(
        &mut self,
        submitter: Address,
        seq: usize,
        sub: &SubChannelState,
        now: DateTime<Utc>,
    ) -> metachannel_types::Result<()> {
        let snapshot = self.history[seq].clone();
        let proof = snapshot.proof(sub);
        self.metachannel()
            .start_settle_state_subchannel(&proof, &snapshot.meta, sub.clone(), submitter, now)
    }
}
