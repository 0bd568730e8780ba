//! Keccak-256 helpers.

use sha3::{Digest, Keccak256};

use crate::{H256, constants};

/// Keccak-256 of `input`.
#[must_use]
pub fn keccak256(input: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(input);
    H256(hasher.finalize().into())
}

/// Keccak-256 over the concatenation of `parts`, without allocating.
#[must_use]
pub fn keccak256_concat(parts: &[&[u8]]) -> H256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256(hasher.finalize().into())
}

/// Digest a party actually signs for `message_hash`:
/// `keccak256("\x19Ethereum Signed Message:\n32" || message_hash)`.
#[must_use]
pub fn personal_message_hash(message_hash: &H256) -> H256 {
    keccak256_concat(&[constants::PERSONAL_MESSAGE_PREFIX, message_hash.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        // Well-known keccak-256("") digest.
        assert_eq!(
            keccak256(b"").to_string(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn concat_matches_single_buffer() {
        assert_eq!(keccak256_concat(&[b"ab", b"cd"]), keccak256(b"abcd"));
    }

    #[test]
    fn personal_hash_differs_from_raw() {
        let h = keccak256(b"state");
        assert_ne!(personal_message_hash(&h), h);
    }
}
