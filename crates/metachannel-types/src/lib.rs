//! # metachannel-types
//!
//! Shared types, canonical codec, errors, and configuration for two-party
//! **meta-channels**.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Address`], [`H256`], [`ChannelId`], [`AgreementId`], [`Amount`]
//! - **State codec**: [`codec::Encoder`], [`codec::Decoder`], [`CanonicalState`]
//! - **State model**: [`MetaChannelState`], [`SubChannelState`], [`SignedState`]
//! - **Signatures**: [`Signature`] (wire format only)
//! - **Lifecycle**: [`SubChannelPhase`], [`MetaChannelPhase`]
//! - **Deployment identity**: [`CounterfactualIdentity`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`ChannelError`] with `MC_ERR_` prefix codes
//! - **Constants**: wire widths and defaults

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod identity;
pub mod ids;
pub mod lifecycle;
pub mod signature;
pub mod state;

// Re-export all primary types at crate root for ergonomic imports:
//   use metachannel_types::{MetaChannelState, SubChannelState, ChannelError, ...};

pub use codec::CanonicalState;
pub use config::*;
pub use error::*;
pub use hash::{keccak256, personal_message_hash};
pub use identity::*;
pub use ids::*;
pub use lifecycle::*;
pub use signature::*;
pub use state::*;

// Constants are accessed via `metachannel_types::constants::FOO`
// (not re-exported to avoid name collisions).
