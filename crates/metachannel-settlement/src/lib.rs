//! # metachannel-settlement
//!
//! **Settlement plane**: the on-chain half of a meta-channel.
//!
//! ## Architecture
//!
//! [`MetaChannel`] is the deployed settlement contract. It receives
//! co-signed states from either party and:
//! 1. Verifies the joint signature over the meta-state
//! 2. Verifies the sub-channel's inclusion proof under the meta root
//! 3. Asks the sub-channel's interpreter whether the transition is allowed
//! 4. Runs a challenge window per sub-channel, then one for the meta-channel
//! 5. Reports final balances once each window has closed
//!
//! It never holds value. The escrow ledger pays out against the outcomes
//! reported here and checks [`EscrowConservation`] after every payout.

pub mod conservation;
pub mod interpreter;
pub mod metachannel;

pub use conservation::EscrowConservation;
pub use interpreter::{
    BidirectionalPayment, InterpreterSet, SubChannelInterpreter, builtin_interpreter,
};
pub use metachannel::{
    MetaChannel, MetaChannelOutcome, MetaChannelRecord, SubChannelOutcome, SubChannelRecord,
};
