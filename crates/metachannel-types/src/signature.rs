//! Fixed-width signature wire format.
//!
//! A signature is `r (32) || s (32) || v (1)` where `v` is the recovery
//! discriminant in the Ethereum convention (`27` or `28`). This module only
//! validates the *shape*; recovery lives in `metachannel-core`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ChannelError, Result, constants};

/// Recoverable ECDSA signature triple.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    /// Parse the 65-byte `r || s || v` form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != constants::SIGNATURE_SIZE {
            return Err(ChannelError::invalid_signature(format!(
                "expected {} bytes, got {}",
                constants::SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let sig = Self { r, s, v: bytes[64] };
        sig.recovery_index()?;
        Ok(sig)
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; constants::SIGNATURE_SIZE] {
        let mut out = [0u8; constants::SIGNATURE_SIZE];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// The recovery index (`0` or `1`) encoded by `v`.
    ///
    /// Only `27` and `28` are accepted; the x-reduced recovery ids `2`/`3`
    /// and raw `0`/`1` are rejected so that every key has exactly one
    /// accepted `v` per signature.
    pub fn recovery_index(&self) -> Result<u8> {
        match self.v.checked_sub(constants::RECOVERY_ID_OFFSET) {
            Some(idx @ (0 | 1)) => Ok(idx),
            _ => Err(ChannelError::invalid_signature(format!(
                "recovery discriminant v={} outside {{27, 28}}",
                self.v
            ))),
        }
    }

    /// `r || s`, the 64-byte compact form.
    #[must_use]
    pub fn compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{}..,v={})", hex::encode(&self.r[..4]), self.v)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: u8) -> Vec<u8> {
        let mut bytes = vec![0x11; 32];
        bytes.extend_from_slice(&[0x22; 32]);
        bytes.push(v);
        bytes
    }

    #[test]
    fn parses_canonical_discriminants() {
        assert_eq!(Signature::from_bytes(&sample(27)).unwrap().recovery_index().unwrap(), 0);
        assert_eq!(Signature::from_bytes(&sample(28)).unwrap().recovery_index().unwrap(), 1);
    }

    #[test]
    fn rejects_out_of_range_discriminant() {
        for v in [0u8, 1, 26, 29, 30, 255] {
            let err = Signature::from_bytes(&sample(v)).unwrap_err();
            assert!(
                matches!(err, ChannelError::InvalidSignature { .. }),
                "v={v} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_wrong_width() {
        assert!(Signature::from_bytes(&[0u8; 64]).is_err());
        assert!(Signature::from_bytes(&[0u8; 66]).is_err());
    }

    #[test]
    fn bytes_roundtrip() {
        let bytes = sample(28);
        let sig = Signature::from_bytes(&bytes).unwrap();
        assert_eq!(sig.to_bytes().to_vec(), bytes);
    }
}
