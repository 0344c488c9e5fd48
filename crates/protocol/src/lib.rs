//! Wire types for the supervisor/worker chat protocol.
//!
//! This crate contains the serde-serializable shapes that cross the boundary
//! between a supervisor and the worker it hosts. They are the "protocol layer":
//! the data as it appears on the channel, not the behaviour around it.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no behaviour beyond construction and (de)serialization
//! * Immutable once built: envelopes expose accessors, not setters
//! * Stable: changes only when the message contract changes
//!
//! Lifecycle, polling, and fan-out live in `chatpilot-runtime`.

pub mod cookie;
pub mod error;
pub mod event;
pub mod message;

pub use cookie::*;
pub use error::*;
pub use event::*;
pub use message::*;
