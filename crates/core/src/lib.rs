//! Shared conversation model for the concierge pipeline.
//!
//! Every stage (reconciliation, model driving, stream merging) speaks in
//! terms of [`Message`], [`Part`] and [`StreamEvent`]. Nothing in this crate
//! performs I/O.

pub mod event;
pub mod money;
pub mod types;

pub use event::{FinishReason, StreamEvent};
pub use money::{dollars_to_cents, format_cents, Cents};
pub use types::*;
