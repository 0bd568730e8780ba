//! On-chain lifecycle phases.
//!
//! ## Sub-channel
//!
//! ```text
//!   ┌──────┐ start_settle_state ┌──────────┐ begin_settling ┌──────────┐
//!   │ OPEN ├───────────────────▶│ DISPUTED ├───────────────▶│ SETTLING │
//!   └──────┘                    └────┬─────┘                └────┬─────┘
//!                                    │ close_with_timeout         │
//!                                    ▼                            │
//!                               ┌────────┐◀──────────────────────┘
//!                               │ CLOSED │
//!                               └────────┘
//! ```
//!
//! ## Meta-channel
//!
//! ```text
//!   OPEN ──start_settle──▶ DISPUTED ──close_with_timeout──▶ CLOSED
//! ```
//!
//! Transitions are **monotonic**: nothing ever returns to an earlier phase.
//! Counter-submissions keep the phase and only replace the recorded state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a sub-channel on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubChannelPhase {
    /// No dispute has been raised on-chain.
    Open,
    /// A signed state was submitted; the challenge window is running.
    Disputed,
    /// The escrow moved the sub-channel's share into settlement custody;
    /// the challenge window is still running.
    Settling,
    /// Final balances fixed. **Irreversible.**
    Closed,
}

impl SubChannelPhase {
    /// Can this phase transition to the given target phase?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Disputed)
                | (Self::Disputed, Self::Settling | Self::Closed)
                | (Self::Settling, Self::Closed)
        )
    }

    /// A dispute is running (counter-submissions and timeout close allowed).
    #[must_use]
    pub fn in_dispute(&self) -> bool {
        matches!(self, Self::Disputed | Self::Settling)
    }
}

impl fmt::Display for SubChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Settling => write!(f, "SETTLING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Lifecycle of the meta-channel on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaChannelPhase {
    Open,
    Disputed,
    /// Final top-level balances fixed. **Irreversible.**
    Closed,
}

impl MetaChannelPhase {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Disputed) | (Self::Disputed, Self::Closed)
        )
    }
}

impl fmt::Display for MetaChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_transitions_valid() {
        use SubChannelPhase::*;
        assert!(Open.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Settling));
        assert!(Disputed.can_transition_to(Closed));
        assert!(Settling.can_transition_to(Closed));
    }

    #[test]
    fn sub_transitions_invalid() {
        use SubChannelPhase::*;
        assert!(!Open.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Settling));
        assert!(!Settling.can_transition_to(Disputed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Disputed));
        assert!(!Disputed.can_transition_to(Disputed));
    }

    #[test]
    fn meta_transitions() {
        use MetaChannelPhase::*;
        assert!(Open.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Disputed));
    }

    #[test]
    fn in_dispute_covers_disputed_and_settling() {
        assert!(SubChannelPhase::Disputed.in_dispute());
        assert!(SubChannelPhase::Settling.in_dispute());
        assert!(!SubChannelPhase::Open.in_dispute());
        assert!(!SubChannelPhase::Closed.in_dispute());
    }

    #[test]
    fn phase_display() {
        assert_eq!(SubChannelPhase::Settling.to_string(), "SETTLING");
        assert_eq!(MetaChannelPhase::Disputed.to_string(), "DISPUTED");
    }

    #[test]
    fn phase_serde_roundtrip() {
        let phase = SubChannelPhase::Disputed;
        let json = serde_json::to_string(&phase).unwrap();
        let back: SubChannelPhase = serde_json::from_str(&json).unwrap();
        assert_eq!(phase, back);
    }
}
