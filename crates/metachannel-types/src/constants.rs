//! System-wide constants for the meta-channel settlement engine.

/// Width of one canonical encoding word, in bytes.
pub const WORD_SIZE: usize = 32;

/// Width of an account / contract address, in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Width of a keccak-256 digest, in bytes.
pub const HASH_SIZE: usize = 32;

/// Width of an encoded signature: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_SIZE: usize = 65;

/// Recovery discriminant offset used by Ethereum-style signatures (`v = 27 + recid`).
pub const RECOVERY_ID_OFFSET: u8 = 27;

/// Number of canonical words in an encoded `MetaChannelState`.
pub const META_STATE_FIELDS: usize = 8;

/// Number of canonical words in an encoded `SubChannelState`.
pub const SUB_STATE_FIELDS: usize = 13;

/// Default meta-channel challenge window in seconds (one day).
pub const DEFAULT_META_CHALLENGE_WINDOW_SECS: u64 = 86_400;

/// Default minimum quiet period before a force-push may be used, in seconds.
pub const DEFAULT_FORCE_PUSH_RESPONSE_WINDOW_SECS: u64 = 3_600;

/// Default cap on sub-channels committed by one meta-state.
pub const DEFAULT_MAX_SUBCHANNELS: usize = 1_024;

/// Maximum number of steps accepted in an inclusion proof.
///
/// A carry-forward binary tree over `2^64` leaves never needs more.
pub const MAX_PROOF_DEPTH: usize = 64;

/// Prefix of the personal-message digest signed by parties.
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Metachannel";
