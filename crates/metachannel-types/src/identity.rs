//! Counterfactual identity: an address computable before deployment.
//!
//! Both parties sign messages that name "the channel" long before it
//! exists on-chain. The address is a pure function of the code, the
//! constructor arguments, and the signer set:
//!
//! ```text
//! identity_hash = keccak256( code_hash || keccak256(constructor_args)
//!                            || signer_count || signer_0 || ... )
//! address       = identity_hash[12..]
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    Address, ChannelError, H256, Result,
    codec::Encoder,
    hash::keccak256,
};

/// Everything that defines a not-yet-deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterfactualIdentity {
    /// Hash of the code template to materialize.
    pub code_hash: H256,
    /// Canonically encoded constructor arguments.
    pub constructor_args: Vec<u8>,
    /// Every party that must co-sign the deployment, in order.
    pub signers: Vec<Address>,
}

impl CounterfactualIdentity {
    /// Build an identity. Signers must be non-empty and distinct.
    pub fn new(code_hash: H256, constructor_args: Vec<u8>, signers: Vec<Address>) -> Result<Self> {
        if signers.is_empty() {
            return Err(ChannelError::IdentityMismatch {
                reason: "identity has no signers".into(),
            });
        }
        for (i, signer) in signers.iter().enumerate() {
            if signers[..i].contains(signer) {
                return Err(ChannelError::IdentityMismatch {
                    reason: format!("duplicate signer {signer}"),
                });
            }
        }
        Ok(Self {
            code_hash,
            constructor_args,
            signers,
        })
    }

    /// Canonical encoding of the identity-defining tuple.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_fields(3 + self.signers.len());
        enc.h256(&self.code_hash)
            .h256(&keccak256(&self.constructor_args))
            .u64(self.signers.len() as u64);
        for signer in &self.signers {
            enc.address(signer);
        }
        enc.finish()
    }

    /// The hash every signer signs to authorize deployment.
    #[must_use]
    pub fn identity_hash(&self) -> H256 {
        keccak256(&self.encode())
    }

    /// The counterfactual address.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::from_digest(&self.identity_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(addrs: &[Address]) -> Vec<u8> {
        let mut enc = Encoder::new();
        for a in addrs {
            enc.address(a);
        }
        enc.finish()
    }

    fn identity() -> CounterfactualIdentity {
        let a = Address([1; 20]);
        let b = Address([2; 20]);
        CounterfactualIdentity::new(
            keccak256(b"code"),
            args(&[Address([9; 20]), a, b]),
            vec![a, b],
        )
        .unwrap()
    }

    #[test]
    fn address_is_deterministic() {
        assert_eq!(identity().address(), identity().address());
    }

    #[test]
    fn every_component_changes_address() {
        let base = identity();
        let mut other_code = base.clone();
        other_code.code_hash = keccak256(b"other");
        let mut other_args = base.clone();
        other_args.constructor_args = args(&[Address([8; 20])]);
        let mut other_signers = base.clone();
        other_signers.signers.reverse();

        for v in [other_code, other_args, other_signers] {
            assert_ne!(v.address(), base.address());
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_signers() {
        assert!(CounterfactualIdentity::new(H256::zero(), vec![], vec![]).is_err());
        let a = Address([1; 20]);
        assert!(CounterfactualIdentity::new(H256::zero(), vec![], vec![a, a]).is_err());
    }
}
