//! Agent registry and concurrent execution for the signal consensus engine
//!
//! - [`AgentRegistry`]: catalog of agents with weight, enabled flag and tags
//! - [`AgentExecutor`]: runs a registry snapshot concurrently against one
//!   subject, converting timeouts, faults and malformed output into data
//! - [`ExecutionObserver`]: optional callbacks during a round

pub mod executor;
pub mod outcome;
pub mod registry;

pub use executor::{AgentExecutor, ExecutionObserver, ExecutorConfig, NoOpObserver};
pub use outcome::{AgentFailure, AgentOutcome, ExecutionResult, FailureKind, FailureTally};
pub use registry::{AgentDescriptor, AgentRegistry, RegistryEntry, RegistrySnapshot};
