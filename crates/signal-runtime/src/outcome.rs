//! Per-agent results of an execution round

use crate::registry::AgentDescriptor;
use serde::{Deserialize, Serialize};
use signal_core::Signal;
use std::fmt;
use std::time::Duration;

/// Why an agent produced no signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The agent did not finish within its timeout
    Timeout,
    /// The agent returned an error or panicked
    AgentError,
    /// The agent's output failed validation
    InvalidOutput,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::AgentError => "agent_error",
            FailureKind::InvalidOutput => "invalid_output",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AgentFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Either a validated signal or a structured failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Success(Signal),
    Failure(AgentFailure),
}

/// Result of one agent in one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub descriptor: AgentDescriptor,
    pub result: ExecutionResult,
    pub latency: Duration,
}

impl AgentOutcome {
    pub fn signal(&self) -> Option<&Signal> {
        match &self.result {
            ExecutionResult::Success(signal) => Some(signal),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AgentFailure> {
        match &self.result {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(failure) => Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, ExecutionResult::Success(_))
    }
}

/// Failure counts reported next to a consensus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureTally {
    pub timeouts: usize,
    pub agent_errors: usize,
    pub invalid_outputs: usize,
}

impl FailureTally {
    pub fn from_outcomes(outcomes: &[AgentOutcome]) -> Self {
        let mut tally = Self::default();
        for failure in outcomes.iter().filter_map(AgentOutcome::failure) {
            tally.record(failure.kind);
        }
        tally
    }

    pub fn record(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Timeout => self.timeouts += 1,
            FailureKind::AgentError => self.agent_errors += 1,
            FailureKind::InvalidOutput => self.invalid_outputs += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.timeouts + self.agent_errors + self.invalid_outputs
    }
}
