//! Identifiers and value types shared by every crate in the workspace.
//!
//! `Address` and `H256` are fixed-width byte strings displayed as
//! `0x`-prefixed hex. `AgreementId` uses UUIDv7 for time-ordered sorting.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ChannelError, Result, constants, hash::keccak256};

fn decode_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| ChannelError::Serialization(e.to_string()))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        ChannelError::Serialization(format!("expected {N} bytes, got {}", v.len()))
    })
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// 20-byte account or contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address(pub [u8; constants::ADDRESS_SIZE]);

impl Address {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; constants::ADDRESS_SIZE])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; constants::ADDRESS_SIZE] {
        &self.0
    }

    /// Take the low 20 bytes of a digest (the EVM address convention).
    #[must_use]
    pub fn from_digest(digest: &H256) -> Self {
        let mut out = [0u8; constants::ADDRESS_SIZE];
        out.copy_from_slice(&digest.0[constants::HASH_SIZE - constants::ADDRESS_SIZE..]);
        Self(out)
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex_fixed(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// H256
// ---------------------------------------------------------------------------

/// 32-byte keccak-256 digest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct H256(pub [u8; constants::HASH_SIZE]);

impl H256 {
    /// The all-zero digest. Used as the sub-channel root of a meta-state
    /// that commits to no sub-channels.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; constants::HASH_SIZE])
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; constants::HASH_SIZE]
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; constants::HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for H256 {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex_fixed(s).map(Self)
    }
}

impl From<[u8; constants::HASH_SIZE]> for H256 {
    fn from(bytes: [u8; constants::HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Caller-chosen salt identifying a sub-channel within its meta-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ChannelId(pub H256);

impl ChannelId {
    /// Derive a channel id by hashing a salt, e.g. `ChannelId::from_salt("salt1")`.
    #[must_use]
    pub fn from_salt(salt: &str) -> Self {
        Self(keccak256(salt.as_bytes()))
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0.0[..4])
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch:{}", hex::encode(&self.0.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AgreementId
// ---------------------------------------------------------------------------

/// Unique identifier for an escrow agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AgreementId(pub Uuid);

impl AgreementId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AgreementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgreementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agr:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// Unsigned value in base units (wei). All arithmetic is checked.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Base units per whole ether.
    pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

    /// Whole ether expressed in wei.
    #[must_use]
    pub const fn ether(whole: u64) -> Self {
        Self(whole as u128 * Self::WEI_PER_ETHER)
    }

    #[must_use]
    pub const fn wei(value: u128) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(ChannelError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(ChannelError::AmountOverflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random identifiers for testing.
#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl ChannelId {
    pub fn random() -> Self {
        Self(H256(rand::random()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
