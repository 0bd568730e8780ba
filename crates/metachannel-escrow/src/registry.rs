//! Deferred deployment registry.
//!
//! Parties agree on a contract by signing its [`CounterfactualIdentity`]
//! and only ever deploy it if a dispute needs it. The registry maps the
//! counterfactual address everyone already signed against to the address
//! the contract actually landed at:
//!
//! ```text
//!   identity ──sign(identity_hash) by every signer──▶ deploy()
//!        │                                              │
//!        └── address() ── counterfactual ──▶ resolved ──┘── deployed (CREATE-style)
//! ```
//!
//! A counterfactual address resolves at most once.

use std::{collections::HashMap, time::Duration};

use metachannel_core::JointAuthorization;
use metachannel_types::{
    Address, ChannelError, CounterfactualIdentity, EngineConfig, H256, Result, Signature,
    codec::{Decoder, Encoder},
    constants, keccak256,
};
use metachannel_settlement::{InterpreterSet, MetaChannel};

/// A contract template the registry can materialize.
///
/// Everything an instance needs must come from the signed identity, so a
/// deployer cannot choose inputs the signers never saw.
pub trait Deployable: Sized {
    /// Hash identifying the template; must match `identity.code_hash`.
    fn code_hash() -> H256;

    fn instantiate(identity: &CounterfactualIdentity, deployed_at: Address) -> Result<Self>;
}

/// Resolves counterfactual identities to live deployments of `T`.
#[derive(Debug)]
pub struct Registry<T: Deployable> {
    address: Address,
    nonce: u64,
    /// Counterfactual address → deployed address.
    resolved: HashMap<Address, Address>,
    /// Deployed address → instance.
    deployments: HashMap<Address, T>,
}

impl<T: Deployable> Registry<T> {
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nonce: 0,
            resolved: HashMap::new(),
            deployments: HashMap::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Materialize `identity` once every signer has signed its hash.
    ///
    /// # Errors
    /// - `IdentityMismatch` if the code hash is not `T`'s
    /// - `InvalidSignature` if any signer's signature is missing or wrong
    /// - `AlreadyDeployed` if the identity already resolves
    /// - whatever `T::instantiate` rejects in the constructor arguments
    pub fn deploy(
        &mut self,
        identity: &CounterfactualIdentity,
        signatures: &[Signature],
    ) -> Result<Address> {
        if identity.code_hash != T::code_hash() {
            return Err(ChannelError::IdentityMismatch {
                reason: format!(
                    "code hash {} does not match template {}",
                    identity.code_hash,
                    T::code_hash()
                ),
            });
        }
        let counterfactual = identity.address();
        if let Some(deployed) = self.resolved.get(&counterfactual) {
            tracing::warn!(
                counterfactual = %counterfactual,
                deployed = %deployed,
                "Repeat deployment rejected"
            );
            return Err(ChannelError::AlreadyDeployed(counterfactual));
        }
        JointAuthorization::new(identity.signers.clone())?
            .verify(&identity.identity_hash(), signatures)?;

        let deployed_at = self.next_address();
        let instance = T::instantiate(identity, deployed_at)?;

        self.nonce += 1;
        self.resolved.insert(counterfactual, deployed_at);
        self.deployments.insert(deployed_at, instance);
        tracing::info!(
            counterfactual = %counterfactual,
            deployed = %deployed_at,
            nonce = self.nonce,
            "Counterfactual contract deployed"
        );
        Ok(deployed_at)
    }

    /// `keccak256(registry || nonce)[12..]`.
    fn next_address(&self) -> Address {
        let preimage = Encoder::with_fields(2)
            .address(&self.address)
            .u64(self.nonce)
            .finish();
        Address::from_digest(&keccak256(&preimage))
    }

    #[must_use]
    pub fn resolve_address(&self, counterfactual: &Address) -> Option<Address> {
        self.resolved.get(counterfactual).copied()
    }

    pub fn get(&self, counterfactual: &Address) -> Result<&T> {
        self.resolve_address(counterfactual)
            .and_then(|deployed| self.deployments.get(&deployed))
            .ok_or(ChannelError::NotDeployed(*counterfactual))
    }

    pub fn get_mut(&mut self, counterfactual: &Address) -> Result<&mut T> {
        let deployed = self
            .resolve_address(counterfactual)
            .ok_or(ChannelError::NotDeployed(*counterfactual))?;
        self.deployments
            .get_mut(&deployed)
            .ok_or(ChannelError::NotDeployed(*counterfactual))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MetaChannel as a deployable template
// ---------------------------------------------------------------------------

/// Constructor arguments of a meta-channel.
///
/// ```text
/// registry | party_a | party_b | meta_window_secs | force_push_secs
///   | max_subchannels | n | (interpreter, code_hash) * n
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaChannelArgs {
    pub registry: Address,
    pub party_a: Address,
    pub party_b: Address,
    pub config: EngineConfig,
    /// `(address, code_hash)` per interpreter, ordered by address.
    pub interpreters: Vec<(Address, H256)>,
}

impl MetaChannelArgs {
    const FIXED_FIELDS: usize = 7;

    /// Encode; windows must be whole seconds.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.config.validate()?;
        let meta_window = whole_secs("meta_challenge_window", self.config.meta_challenge_window)?;
        let force_push = whole_secs(
            "force_push_response_window",
            self.config.force_push_response_window,
        )?;
        let max_subchannels = u64::try_from(self.config.max_subchannels)
            .map_err(|e| ChannelError::Configuration(format!("max_subchannels: {e}")))?;

        let mut enc = Encoder::with_fields(Self::FIXED_FIELDS + 2 * self.interpreters.len());
        enc.address(&self.registry)
            .address(&self.party_a)
            .address(&self.party_b)
            .u64(meta_window)
            .u64(force_push)
            .u64(max_subchannels)
            .u64(self.interpreters.len() as u64);
        for (address, code_hash) in &self.interpreters {
            enc.address(address).h256(code_hash);
        }
        Ok(enc.finish())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut d = Decoder::unbounded(bytes)?;
        let registry = d.address("registry")?;
        let party_a = d.address("party_a")?;
        let party_b = d.address("party_b")?;
        let meta_window = d.u64("meta_window_secs")?;
        let force_push = d.u64("force_push_secs")?;
        let max_subchannels = usize::try_from(d.u64("max_subchannels")?)
            .map_err(|e| ChannelError::malformed(format!("max_subchannels: {e}")))?;
        let count = d.u64("interpreter_count")?;
        let declared_words = usize::try_from(count).ok().and_then(|n| n.checked_mul(2));
        if declared_words != Some(d.remaining()) {
            return Err(ChannelError::malformed(format!(
                "{count} interpreters declared, {} words follow",
                d.remaining()
            )));
        }
        let mut interpreters = Vec::with_capacity(d.remaining() / 2);
        while d.remaining() > 0 {
            interpreters.push((d.address("interpreter")?, d.h256("interpreter_code_hash")?));
        }
        d.finish()?;

        let config = EngineConfig {
            meta_challenge_window: Duration::from_secs(meta_window),
            force_push_response_window: Duration::from_secs(force_push),
            max_subchannels,
        };
        config.validate()?;
        Ok(Self {
            registry,
            party_a,
            party_b,
            config,
            interpreters,
        })
    }
}

fn whole_secs(field: &str, window: Duration) -> Result<u64> {
    if window.subsec_nanos() != 0 {
        return Err(ChannelError::Configuration(format!(
            "{field} must be a whole number of seconds"
        )));
    }
    Ok(window.as_secs())
}

impl Deployable for MetaChannel {
    fn code_hash() -> H256 {
        keccak256(format!("{}.MetaChannel", constants::ENGINE_NAME).as_bytes())
    }

    /// The signers must be exactly `[party_a, party_b]`. States name the
    /// counterfactual address, so that is the address the instance
    /// answers to.
    fn instantiate(identity: &CounterfactualIdentity, _deployed_at: Address) -> Result<Self> {
        let args = MetaChannelArgs::decode(&identity.constructor_args)?;
        if identity.signers != [args.party_a, args.party_b] {
            return Err(ChannelError::IdentityMismatch {
                reason: "signers must be exactly the two parties".into(),
            });
        }
        MetaChannel::new(
            identity.address(),
            args.registry,
            args.party_a,
            args.party_b,
            args.config,
            InterpreterSet::from_bindings(&args.interpreters)?,
        )
    }
}

/// Identity both parties sign before funding a meta-channel. The config
/// and interpreter set become part of the signed arguments.
pub fn metachannel_identity(
    registry: Address,
    party_a: Address,
    party_b: Address,
    config: &EngineConfig,
    interpreters: &InterpreterSet,
) -> Result<CounterfactualIdentity> {
    let args = MetaChannelArgs {
        registry,
        party_a,
        party_b,
        config: config.clone(),
        interpreters: interpreters.bindings(),
    }
    .encode()?;
    CounterfactualIdentity::new(MetaChannel::code_hash(), args, vec![party_a, party_b])
}
