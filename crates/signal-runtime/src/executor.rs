//! Concurrent agent executor
//!
//! The AgentExecutor runs one round for one subject:
//! 1. Spawn one task per enabled agent in the snapshot
//! 2. Bound each task by its own timeout, aborting it on expiry
//! 3. Convert errors, panics and malformed verdicts into failure results
//! 4. Wait for every task, then return outcomes in registry order

use crate::outcome::{AgentFailure, AgentOutcome, ExecutionResult, FailureKind, FailureTally};
use crate::registry::{RegistryEntry, RegistrySnapshot};
use async_trait::async_trait;
use futures::future::join_all;
use signal_core::{AgentContext, Error, Signal};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Default per-agent timeout
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Callbacks during an execution round
///
/// Implement this trait to stream per-agent progress to a client or collect
/// metrics. All methods default to no-ops.
#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    /// Called before any agent is dispatched
    async fn on_round_start(&self, _round_id: Uuid, _subject_id: &str, _agent_count: usize) {}

    /// Called when an agent's task is dispatched
    async fn on_agent_start(&self, _agent_id: &str) {}

    /// Called when an agent has a result, including timeouts
    async fn on_agent_done(&self, _agent_id: &str, _result: &ExecutionResult, _latency: Duration) {}

    /// Called once every agent has a result
    async fn on_round_complete(&self, _round_id: Uuid, _outcomes: &[AgentOutcome]) {}
}

/// No-op observer for when events are not needed
pub struct NoOpObserver;

#[async_trait]
impl ExecutionObserver for NoOpObserver {}

/// Configuration for agent execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout applied to agents without their own override
    pub agent_timeout: Duration,

    /// Maximum agents evaluating at once; `None` runs all of them together.
    /// Time spent waiting for a slot counts against the agent's timeout.
    pub max_concurrency: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
            max_concurrency: None,
        }
    }
}

/// Runs a registry snapshot concurrently against one subject
///
/// One agent's failure never affects another: each agent runs in its own
/// task, and the only shared state is the read-only context.
pub struct AgentExecutor {
    config: ExecutorConfig,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl AgentExecutor {
    /// Create a new executor
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Set the observer for receiving execution events
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every agent in `snapshot` against `subject_id`
    pub async fn execute(
        &self,
        subject_id: &str,
        snapshot: &RegistrySnapshot,
        context: Arc<AgentContext>,
    ) -> Vec<AgentOutcome> {
        self.execute_round(Uuid::new_v4(), subject_id, snapshot, context)
            .await
    }

    /// Run a round under a caller-chosen round id
    pub async fn execute_round(
        &self,
        round_id: Uuid,
        subject_id: &str,
        snapshot: &RegistrySnapshot,
        context: Arc<AgentContext>,
    ) -> Vec<AgentOutcome> {
        let span = tracing::info_span!(
            "execution_round",
            round_id = %round_id,
            subject = %subject_id,
            agents = snapshot.len()
        );

        async {
            if let Some(observer) = &self.observer {
                observer
                    .on_round_start(round_id, subject_id, snapshot.len())
                    .await;
            }

            let started = Instant::now();
            let semaphore = self
                .config
                .max_concurrency
                .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

            let pending = snapshot.entries().iter().cloned().map(|entry| {
                let timeout = entry
                    .descriptor
                    .timeout
                    .unwrap_or(self.config.agent_timeout);
                run_agent(
                    entry,
                    subject_id.to_string(),
                    Arc::clone(&context),
                    semaphore.clone(),
                    timeout,
                    self.observer.clone(),
                )
            });

            // join_all yields results in input order, i.e. registry order
            let outcomes = join_all(pending).await;

            let tally = FailureTally::from_outcomes(&outcomes);
            info!(
                succeeded = outcomes.len() - tally.total(),
                timeouts = tally.timeouts,
                agent_errors = tally.agent_errors,
                invalid_outputs = tally.invalid_outputs,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Execution round complete"
            );

            if let Some(observer) = &self.observer {
                observer.on_round_complete(round_id, &outcomes).await;
            }

            outcomes
        }
        .instrument(span)
        .await
    }
}

impl Default for AgentExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

/// Run one agent in its own task and turn whatever happens into an outcome
async fn run_agent(
    entry: RegistryEntry,
    subject_id: String,
    context: Arc<AgentContext>,
    semaphore: Option<Arc<Semaphore>>,
    timeout: Duration,
    observer: Option<Arc<dyn ExecutionObserver>>,
) -> AgentOutcome {
    let RegistryEntry { descriptor, agent } = entry;
    let agent_id = descriptor.id.clone();

    if let Some(observer) = &observer {
        observer.on_agent_start(&agent_id).await;
    }
    debug!(agent_id = %agent_id, timeout_ms = timeout.as_millis() as u64, "Dispatching agent");

    let started = Instant::now();
    let mut handle = tokio::spawn(
        async move {
            let _permit = match semaphore {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            agent.evaluate(&subject_id, &context).await
        }
        .in_current_span(),
    );

    let result = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(verdict))) => match Signal::from_verdict(verdict, &agent_id) {
            Ok(signal) => ExecutionResult::Success(signal),
            Err(e) => failed(FailureKind::InvalidOutput, e.to_string()),
        },
        Ok(Ok(Err(Error::InvalidOutput(message)))) => failed(FailureKind::InvalidOutput, message),
        Ok(Ok(Err(e))) => failed(FailureKind::AgentError, e.to_string()),
        Ok(Err(join_error)) => {
            let message = if join_error.is_panic() {
                format!("agent panicked: {}", panic_message(join_error.into_panic()))
            } else {
                "agent task was cancelled".to_string()
            };
            failed(FailureKind::AgentError, message)
        }
        Err(_) => {
            // Abandon in-flight work; siblings are unaffected
            handle.abort();
            failed(
                FailureKind::Timeout,
                format!("no result within {}ms", timeout.as_millis()),
            )
        }
    };
    let latency = started.elapsed();

    match &result {
        ExecutionResult::Success(signal) => debug!(
            agent_id = %agent_id,
            direction = %signal.direction(),
            confidence = signal.confidence(),
            latency_ms = latency.as_millis() as u64,
            "Agent produced signal"
        ),
        ExecutionResult::Failure(failure) => warn!(
            agent_id = %agent_id,
            kind = %failure.kind,
            error = %failure.message,
            latency_ms = latency.as_millis() as u64,
            "Agent failed"
        ),
    }

    if let Some(observer) = &observer {
        observer.on_agent_done(&agent_id, &result, latency).await;
    }

    AgentOutcome {
        descriptor,
        result,
        latency,
    }
}

fn failed(kind: FailureKind, message: impl Into<String>) -> ExecutionResult {
    ExecutionResult::Failure(AgentFailure::new(kind, message))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
