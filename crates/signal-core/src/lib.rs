//! Core abstractions for the signal consensus engine
//!
//! This crate defines the value types and traits shared by the runtime and the
//! consensus crates: the immutable [`Signal`], the [`Agent`] capability, the
//! read-only [`AgentContext`] handed to every agent, and the error type.

pub mod agent;
pub mod context;
pub mod error;
pub mod signal;

pub use agent::Agent;
pub use context::{AgentContext, DataSource};
pub use error::{Error, Result};
pub use signal::{Direction, Signal, Verdict};
