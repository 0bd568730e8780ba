//! # metachannel-core
//!
//! **Pure channel primitives for two-party meta-channels.**
//!
//! Core is the off-chain plane. Nothing here moves value or keeps time:
//!
//! - **Signature authority**: secp256k1 recoverable signatures over the
//!   personal-message digest of a state hash, plus N-of-N
//!   [`JointAuthorization`]
//! - **Commitment tree**: positional keccak tree over sub-channel state
//!   hashes with carry-forward for odd levels
//! - **Channel session**: one party's copy of the latest co-signed states

pub mod authority;
pub mod merkle;
pub mod session;

pub use authority::{
    JointAuthorization, PartyKey, recover, sign, sign_state, verify_joint, verify_signed,
    verify_signed_by,
};
pub use merkle::{CommitmentTree, InclusionProof, ProofStep, Side, subchannel_root};
pub use session::ChannelSession;
