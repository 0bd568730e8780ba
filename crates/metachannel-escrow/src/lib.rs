//! # metachannel-escrow
//!
//! **Custody plane**: the deferred-deployment registry and the escrow
//! ledger that holds and releases funds.
//!
//! ## Architecture
//!
//! 1. **Registry**: materializes a [`MetaChannel`] from the counterfactual
//!    identity both parties signed, only when a dispute needs it
//! 2. **EscrowLedger**: takes both deposits against the sequence-0
//!    meta-state, moves disputed sub-channel totals into custody, and pays
//!    out the outcomes the deployed meta-channel reports
//!
//! ## Settlement Flow
//!
//! ```text
//! open_agreement → join_agreement → registry.deploy()
//!     → start_settle_state_subchannel → close_subchannel → close_with_timeout_subchannel
//!     → release_subchannel → start_settle → close_with_timeout → close_with_metachannel
//! ```
//!
//! [`MetaChannel`]: metachannel_settlement::MetaChannel

pub mod ledger;
pub mod registry;

pub use ledger::{AgreementStatus, EscrowAgreement, EscrowLedger};
pub use registry::{Deployable, MetaChannelArgs, Registry, metachannel_identity};
