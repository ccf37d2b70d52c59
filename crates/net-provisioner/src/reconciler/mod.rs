//! Cross-region peering reconciliation
//!
//! Wires a secondary region's transit gateway to the primary region's
//! transit gateway and tears the link down again. All waits go through a
//! [`Poller`], which bounds them by an optional deadline and a cancellation
//! token.

mod peering;
mod poll;

pub use peering::{CompletedStep, PeeringOutcome, PeeringProgress, PeeringReconciler};
pub use poll::{PollPolicy, Poller};
