//! Destinations for finished reports

use crate::Result;
use crate::engine::ConsensusReport;
use crate::ensemble::EnsembleOutcome;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// Receives every report the engine produces
///
/// Sink failures are logged by the engine and never fail a round.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Called after each consensus round
    async fn publish_consensus(&self, report: &ConsensusReport) -> Result<()>;

    /// Called after each stage pipeline run
    async fn publish_ensemble(&self, _subject_id: &str, _outcome: &EnsembleOutcome) -> Result<()> {
        Ok(())
    }
}

/// Emits reports as structured log events
pub struct TracingSink;

#[async_trait]
impl ReportSink for TracingSink {
    async fn publish_consensus(&self, report: &ConsensusReport) -> Result<()> {
        tracing::info!(
            round_id = %report.round_id,
            subject = %report.subject_id,
            strategy = %report.consensus.strategy,
            direction = %report.consensus.direction,
            confidence = report.consensus.confidence,
            agreement = report.consensus.agreement_fraction,
            participants = report.consensus.distribution.total(),
            timeouts = report.failures.timeouts,
            agent_errors = report.failures.agent_errors,
            invalid_outputs = report.failures.invalid_outputs,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Consensus report"
        );
        Ok(())
    }

    async fn publish_ensemble(&self, subject_id: &str, outcome: &EnsembleOutcome) -> Result<()> {
        tracing::info!(
            subject = %subject_id,
            profile = %outcome.profile,
            direction = %outcome.direction(),
            score = outcome.score,
            confidence = outcome.confidence,
            degraded = outcome.degraded,
            "Ensemble report"
        );
        Ok(())
    }
}

/// Keeps every report in memory
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<ConsensusReport>>,
    ensembles: Mutex<Vec<(String, EnsembleOutcome)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ConsensusReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ensemble outcomes with the subject they were produced for
    pub fn ensembles(&self) -> Vec<(String, EnsembleOutcome)> {
        self.ensembles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn publish_consensus(&self, report: &ConsensusReport) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
        Ok(())
    }

    async fn publish_ensemble(&self, subject_id: &str, outcome: &EnsembleOutcome) -> Result<()> {
        self.ensembles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((subject_id.to_string(), outcome.clone()));
        Ok(())
    }
}
