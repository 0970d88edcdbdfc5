//! Shared utilities for the signal consensus workspace
//!
//! This crate provides logging setup and application-level configuration used
//! by the binaries in the workspace.

pub mod config;
pub mod logging;

pub use config::{Config, LogFormat};
pub use logging::init_tracing_with;
