//! Signature authority: secp256k1 recoverable ECDSA over keccak digests.
//!
//! Parties sign the personal-message digest of a state hash
//! (`keccak256("\x19Ethereum Signed Message:\n32" || hash)`), so the
//! signature is bound to every state field including the sequence number.
//! Recovery rejects malformed and malleable signatures instead of returning
//! an unrelated address:
//!
//! - `v` outside `{27, 28}` → `InvalidSignature`
//! - `r` or `s` zero / not below the curve order → `InvalidSignature`
//! - high-`s` (the malleated twin of a valid signature) → `InvalidSignature`

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use metachannel_types::{
    Address, ChannelError, H256, Result, Signature, SignedState, TwoPartyState, constants,
    keccak256, personal_message_hash,
};

// ---------------------------------------------------------------------------
// PartyKey
// ---------------------------------------------------------------------------

/// A party's secp256k1 signing key and its derived address.
///
/// Key custody is out of scope; this wrapper only signs.
pub struct PartyKey {
    key: SigningKey,
    address: Address,
}

impl PartyKey {
    /// Load a key from its 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| ChannelError::invalid_signature(format!("bad secret key: {e}")))?;
        Ok(Self::from_signing_key(key))
    }

    /// Deterministic key derived from a label. Handy for fixtures and demos.
    pub fn from_label(label: &str) -> Result<Self> {
        Self::from_secret_bytes(keccak256(label.as_bytes()).as_bytes())
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }
}

/// Random keys for testing.
#[cfg(any(test, feature = "test-helpers"))]
impl PartyKey {
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }
}

impl fmt::Debug for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartyKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Address of a public key: `keccak256(uncompressed_pubkey[1..])[12..]`.
fn address_of(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    Address::from_digest(&keccak256(&encoded.as_bytes()[1..]))
}

// ---------------------------------------------------------------------------
// sign / recover
// ---------------------------------------------------------------------------

/// Sign `message_hash` (personal-message digest) with `key`.
pub fn sign(key: &PartyKey, message_hash: &H256) -> Result<Signature> {
    let digest = personal_message_hash(message_hash);
    let (sig, recid) = key
        .key
        .sign_prehash_recoverable(digest.as_bytes())
        .map_err(|e| ChannelError::Internal(format!("signing failed: {e}")))?;
    if recid.is_x_reduced() {
        return Err(ChannelError::Internal(
            "x-reduced recovery id cannot be encoded".into(),
        ));
    }
    let bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    Ok(Signature {
        r,
        s,
        v: recid.to_byte() + constants::RECOVERY_ID_OFFSET,
    })
}

/// Recover the address that produced `signature` over `message_hash`.
pub fn recover(message_hash: &H256, signature: &Signature) -> Result<Address> {
    let index = signature.recovery_index()?;
    let ecdsa = EcdsaSignature::from_slice(&signature.compact())
        .map_err(|_| ChannelError::invalid_signature("r or s out of range"))?;
    if ecdsa.normalize_s().is_some() {
        return Err(ChannelError::invalid_signature("non-canonical high-s value"));
    }
    let recid = RecoveryId::from_byte(index)
        .ok_or_else(|| ChannelError::invalid_signature("bad recovery id"))?;
    let digest = personal_message_hash(message_hash);
    let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &ecdsa, recid)
        .map_err(|_| ChannelError::invalid_signature("public key recovery failed"))?;
    Ok(address_of(&key))
}

/// `true` iff `sig_a` recovers to `party_a` and `sig_b` to `party_b`.
#[must_use]
pub fn verify_joint(
    message_hash: &H256,
    sig_a: &Signature,
    sig_b: &Signature,
    party_a: Address,
    party_b: Address,
) -> bool {
    matches!(recover(message_hash, sig_a), Ok(a) if a == party_a)
        && matches!(recover(message_hash, sig_b), Ok(b) if b == party_b)
}

// ---------------------------------------------------------------------------
// JointAuthorization
// ---------------------------------------------------------------------------

/// N-of-N authorization over canonical bytes.
///
/// Signature `i` must recover to signer `i`; order matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointAuthorization {
    signers: Vec<Address>,
}

impl JointAuthorization {
    pub fn new(signers: Vec<Address>) -> Result<Self> {
        if signers.is_empty() {
            return Err(ChannelError::invalid_signature("empty signer set"));
        }
        for (i, signer) in signers.iter().enumerate() {
            if signers[..i].contains(signer) {
                return Err(ChannelError::invalid_signature(format!(
                    "duplicate signer {signer}"
                )));
            }
        }
        Ok(Self { signers })
    }

    /// The two-party case used by every channel state.
    pub fn two_party(party_a: Address, party_b: Address) -> Result<Self> {
        Self::new(vec![party_a, party_b])
    }

    #[must_use]
    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    /// Verify that every signer signed `message_hash`.
    pub fn verify(&self, message_hash: &H256, signatures: &[Signature]) -> Result<()> {
        if signatures.len() != self.signers.len() {
            return Err(ChannelError::invalid_signature(format!(
                "expected {} signatures, got {}",
                self.signers.len(),
                signatures.len()
            )));
        }
        for (i, (sig, expected)) in signatures.iter().zip(&self.signers).enumerate() {
            let recovered = recover(message_hash, sig)?;
            if recovered != *expected {
                tracing::debug!(
                    index = i,
                    %recovered,
                    %expected,
                    "Joint authorization signer mismatch"
                );
                return Err(ChannelError::invalid_signature(format!(
                    "signature {i} recovers to {recovered}, expected {expected}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SignedState helpers
// ---------------------------------------------------------------------------

/// Have both parties sign `state`. Keys must match the state's parties.
pub fn sign_state<S: TwoPartyState>(
    state: S,
    key_a: &PartyKey,
    key_b: &PartyKey,
) -> Result<SignedState<S>> {
    if key_a.address() != state.party_a() {
        return Err(ChannelError::UnauthorizedSigner {
            signer: key_a.address(),
        });
    }
    if key_b.address() != state.party_b() {
        return Err(ChannelError::UnauthorizedSigner {
            signer: key_b.address(),
        });
    }
    let hash = state.hash();
    Ok(SignedState {
        sig_a: sign(key_a, &hash)?,
        sig_b: sign(key_b, &hash)?,
        state,
    })
}

/// Verify both signatures against the parties recorded in the state itself.
pub fn verify_signed<S: TwoPartyState>(signed: &SignedState<S>) -> Result<()> {
    verify_signed_by(signed, signed.state.party_a(), signed.state.party_b())
}

/// Verify both signatures against externally known parties.
pub fn verify_signed_by<S: TwoPartyState>(
    signed: &SignedState<S>,
    party_a: Address,
    party_b: Address,
) -> Result<()> {
    if signed.state.party_a() != party_a || signed.state.party_b() != party_b {
        return Err(ChannelError::invalid_signature(
            "state names different parties",
        ));
    }
    JointAuthorization::two_party(party_a, party_b)?
        .verify(&signed.message_hash(), &[signed.sig_a, signed.sig_b])
}
