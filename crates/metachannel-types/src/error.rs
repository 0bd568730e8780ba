//! Error types for the meta-channel settlement engine.
//!
//! All errors use the `MC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Codec errors
//! - 2xx: Authorization errors
//! - 3xx: Sequencing errors
//! - 4xx: Commitment errors
//! - 5xx: Lifecycle / timing errors
//! - 6xx: Deployment errors
//! - 7xx: Escrow errors
//! - 8xx: Safety errors
//! - 9xx: General / internal errors

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{Address, AgreementId, Amount, ChannelId};

/// Central error enum for all meta-channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    // =================================================================
    // Codec Errors (1xx)
    // =================================================================
    /// A canonical byte string could not be decoded.
    #[error("MC_ERR_100: Malformed state: {reason}")]
    MalformedState { reason: String },

    /// Serialization / deserialization error outside the canonical codec.
    #[error("MC_ERR_101: Serialization error: {0}")]
    Serialization(String),

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// Signature is malformed or does not recover to the expected signer.
    #[error("MC_ERR_200: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// The caller is not allowed to perform this operation.
    #[error("MC_ERR_201: Unauthorized signer {signer}")]
    UnauthorizedSigner { signer: Address },

    // =================================================================
    // Sequencing Errors (3xx)
    // =================================================================
    /// Submitted sequence is not strictly greater than the accepted one.
    #[error("MC_ERR_300: Stale state: submitted sequence {submitted}, accepted {accepted}")]
    StaleState { submitted: u64, accepted: u64 },

    // =================================================================
    // Commitment Errors (4xx)
    // =================================================================
    /// An inclusion proof or committed set does not reproduce the root.
    #[error("MC_ERR_400: Proof mismatch: {reason}")]
    ProofMismatch { reason: String },

    // =================================================================
    // Lifecycle / Timing Errors (5xx)
    // =================================================================
    /// Operation invoked outside its valid lifecycle state.
    #[error("MC_ERR_500: Invalid state: {reason}")]
    InvalidState { reason: String },

    /// The challenge window is still open.
    #[error("MC_ERR_501: Timeout not elapsed: deadline {deadline}")]
    TimeoutNotElapsed { deadline: DateTime<Utc> },

    /// The challenge window has already closed.
    #[error("MC_ERR_502: Timeout expired: deadline {deadline}")]
    TimeoutExpired { deadline: DateTime<Utc> },

    /// No dispute record exists for this sub-channel.
    #[error("MC_ERR_503: Unknown sub-channel {0}")]
    UnknownSubChannel(ChannelId),

    /// No interpreter is registered at this address.
    #[error("MC_ERR_504: Unknown interpreter {0}")]
    UnknownInterpreter(Address),

    /// A force-push did not meet its gating conditions.
    #[error("MC_ERR_505: Force-push rejected: {reason}")]
    ForcePushRejected { reason: String },

    // =================================================================
    // Deployment Errors (6xx)
    // =================================================================
    /// The counterfactual identity already resolves to a deployment.
    #[error("MC_ERR_600: Already deployed at counterfactual address {0}")]
    AlreadyDeployed(Address),

    /// The identity does not describe the expected code or signers.
    #[error("MC_ERR_601: Identity mismatch: {reason}")]
    IdentityMismatch { reason: String },

    /// Nothing has been deployed at this counterfactual address.
    #[error("MC_ERR_602: Not deployed: {0}")]
    NotDeployed(Address),

    // =================================================================
    // Escrow Errors (7xx)
    // =================================================================
    /// The escrow agreement does not exist.
    #[error("MC_ERR_700: Agreement not found: {0}")]
    AgreementNotFound(AgreementId),

    /// Attached value differs from the balance in the signed state.
    #[error("MC_ERR_701: Deposit mismatch: expected {expected}, got {actual}")]
    DepositMismatch { expected: Amount, actual: Amount },

    /// The escrow holds less than the amount it must move.
    #[error("MC_ERR_702: Insufficient escrow: need {needed}, held {held}")]
    InsufficientEscrow { needed: Amount, held: Amount },

    /// Funds for this entity were already released.
    #[error("MC_ERR_703: Already released: {reason}")]
    AlreadyReleased { reason: String },

    // =================================================================
    // Safety Errors (8xx)
    // =================================================================
    /// Value in and value out no longer reconcile. Critical.
    #[error("MC_ERR_800: Balance conservation violation: {reason}")]
    BalanceConservationViolation { reason: String },

    /// Checked arithmetic on an amount overflowed or underflowed.
    #[error("MC_ERR_801: Amount overflow")]
    AmountOverflow,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Configuration error (invalid values, unparsable document, etc.).
    #[error("MC_ERR_900: Configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable internal error.
    #[error("MC_ERR_901: Internal error: {0}")]
    Internal(String),
}

impl ChannelError {
    /// Shorthand for [`ChannelError::MalformedState`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedState {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ChannelError::InvalidSignature`].
    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ChannelError::InvalidState`].
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ChannelError::ProofMismatch`].
    pub fn proof_mismatch(reason: impl Into<String>) -> Self {
        Self::ProofMismatch {
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
