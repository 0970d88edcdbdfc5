//! The consensus engine
//!
//! [`ConsensusEngine`] is the single entry point callers use. A consensus
//! round validates its inputs, runs every agent of a registry snapshot
//! concurrently, reduces the valid signals with a strategy and reports the
//! result with the full per-agent breakdown. Stage ensembles run through the
//! same engine so that their configuration and logging stay in one place.

use crate::config::EngineConfig;
use crate::ensemble::{EnsembleAggregator, EnsembleOutcome, ProfileTable, StageScore, stages};
use crate::error::{ConsensusError, Result};
use crate::regime::{RegimeDetector, RegimeIndicators, RegimeState};
use crate::sink::ReportSink;
use crate::strategy::{ConsensusResult, ConsensusStrategy, StrategyKind, Vote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use signal_core::{AgentContext, Signal};
use signal_runtime::{
    AgentExecutor, AgentOutcome, ExecutionObserver, FailureTally, RegistrySnapshot,
};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

/// Everything known about one consensus round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub round_id: Uuid,
    pub subject_id: String,
    pub consensus: ConsensusResult,
    /// The consensus expressed as a signal
    pub signal: Signal,
    /// Per-agent results in registry order
    pub outcomes: Vec<AgentOutcome>,
    pub failures: FailureTally,
    /// True when no agent produced a valid signal
    pub empty_result_set: bool,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl ConsensusReport {
    /// The votes the consensus was computed from
    pub fn votes(&self) -> Vec<Vote> {
        Vote::from_outcomes(&self.outcomes)
    }

    /// Number of agents that produced a valid signal
    pub fn participants(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Reduce this round's signals again with another strategy
    ///
    /// No agent is re-run.
    pub fn recompute(&self, strategy: &dyn ConsensusStrategy) -> ConsensusResult {
        strategy.reduce(&self.votes())
    }
}

/// Produces one named stage of an ensemble
#[async_trait]
pub trait StageProducer: Send + Sync {
    /// Stage name matching a key of the weight profile
    fn stage(&self) -> &str;

    async fn produce(&self, subject_id: &str, context: &AgentContext) -> signal_core::Result<StageScore>;
}

/// Multi-agent consensus and stage ensemble engine
pub struct ConsensusEngine {
    config: EngineConfig,
    executor: AgentExecutor,
    aggregator: EnsembleAggregator,
    detector: RegimeDetector,
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl ConsensusEngine {
    /// Create an engine from a validated configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor: AgentExecutor::new(config.executor_config()),
            aggregator: EnsembleAggregator::new(config.zero_agreement_floor),
            detector: RegimeDetector::new(config.regime_thresholds),
            sinks: Vec::new(),
            config,
        })
    }

    /// Receive execution events from every round
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    /// Publish every report to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the configured default strategy
    pub fn default_strategy(&self) -> Box<dyn ConsensusStrategy> {
        self.config
            .default_strategy
            .build(&self.config.strategy_params)
    }

    /// Run one consensus round
    ///
    /// Only malformed inputs fail: an empty subject or an invalid snapshot.
    /// Agent failures are recorded in the report, and a round where nobody
    /// produced a signal still yields the neutral fallback.
    pub async fn run_consensus(
        &self,
        subject_id: &str,
        snapshot: &RegistrySnapshot,
        strategy: &dyn ConsensusStrategy,
        context: Arc<AgentContext>,
    ) -> Result<ConsensusReport> {
        if subject_id.trim().is_empty() {
            return Err(ConsensusError::InvalidSubject(subject_id.to_string()));
        }
        snapshot.validate()?;

        let round_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "consensus_round",
            round_id = %round_id,
            subject = %subject_id,
            strategy = %strategy.name()
        );

        async {
            let started = Instant::now();
            let outcomes = self
                .executor
                .execute_round(round_id, subject_id, snapshot, context)
                .await;

            let votes = Vote::from_outcomes(&outcomes);
            let failures = FailureTally::from_outcomes(&outcomes);
            let empty_result_set = votes.is_empty();
            if empty_result_set {
                warn!(
                    agents = snapshot.len(),
                    failures = failures.total(),
                    "Empty result set: no agent produced a valid signal"
                );
            }

            let consensus = strategy.reduce(&votes);
            let elapsed = started.elapsed();

            info!(
                direction = %consensus.direction,
                confidence = consensus.confidence,
                agreement = consensus.agreement_fraction,
                participants = votes.len(),
                "Consensus reached"
            );

            let report = ConsensusReport {
                round_id,
                subject_id: subject_id.to_string(),
                signal: consensus.to_signal(),
                consensus,
                outcomes,
                failures,
                empty_result_set,
                elapsed,
                completed_at: Utc::now(),
            };

            for sink in &self.sinks {
                if let Err(e) = sink.publish_consensus(&report).await {
                    warn!(error = %e, "Report sink failed");
                }
            }

            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Run a round with a strategy chosen by name
    ///
    /// Unknown names fail before any agent is dispatched.
    pub async fn run_consensus_named(
        &self,
        subject_id: &str,
        snapshot: &RegistrySnapshot,
        strategy_name: &str,
        context: Arc<AgentContext>,
    ) -> Result<ConsensusReport> {
        let kind: StrategyKind = strategy_name.parse()?;
        let strategy = kind.build(&self.config.strategy_params);
        self.run_consensus(subject_id, snapshot, strategy.as_ref(), context)
            .await
    }

    /// Run a round with the configured default strategy
    pub async fn run_default_consensus(
        &self,
        subject_id: &str,
        snapshot: &RegistrySnapshot,
        context: Arc<AgentContext>,
    ) -> Result<ConsensusReport> {
        let strategy = self.default_strategy();
        self.run_consensus(subject_id, snapshot, strategy.as_ref(), context)
            .await
    }

    /// Combine already-computed stage scores
    pub fn run_stage_ensemble(
        &self,
        scores: &[StageScore],
        table: &ProfileTable,
    ) -> Result<EnsembleOutcome> {
        self.aggregator.aggregate(scores, table)
    }

    pub fn detect_regime(&self, indicators: &RegimeIndicators) -> RegimeState {
        self.detector.detect(indicators)
    }

    /// Detect the regime, then aggregate with regime-aware weights
    ///
    /// When the table weights a `market_regime` stage and the caller did not
    /// supply one, the detected regime fills it.
    pub fn run_regime_ensemble(
        &self,
        scores: &[StageScore],
        table: &ProfileTable,
        indicators: &RegimeIndicators,
    ) -> Result<(RegimeState, EnsembleOutcome)> {
        let regime = self.detector.detect(indicators);

        let mut stage_scores = scores.to_vec();
        let wants_regime = table.primary().weight(stages::MARKET_REGIME).is_some();
        if wants_regime && !scores.iter().any(|s| s.stage == stages::MARKET_REGIME) {
            stage_scores.push(regime.to_stage_score());
        }

        let outcome =
            self.aggregator
                .aggregate_in_regime(&stage_scores, table, Some(regime.regime))?;
        Ok((regime, outcome))
    }

    /// Run stage producers concurrently, then aggregate what they returned
    ///
    /// A producer that errors, panics or exceeds the stage timeout is treated
    /// as a missing stage, so the matching fallback profile applies. Two
    /// producers with the same stage name fail before any of them runs.
    pub async fn run_stage_pipeline(
        &self,
        subject_id: &str,
        producers: &[Arc<dyn StageProducer>],
        table: &ProfileTable,
        context: &AgentContext,
    ) -> Result<EnsembleOutcome> {
        let span = tracing::info_span!(
            "stage_pipeline",
            subject = %subject_id,
            table = %table.name(),
            stages = producers.len()
        );

        let mut seen = BTreeSet::new();
        for producer in producers {
            if !seen.insert(producer.stage()) {
                return Err(ConsensusError::DuplicateStage(producer.stage().to_string()));
            }
        }

        async {
            let timeout = self.config.stage_timeout;
            let runs = producers.iter().map(|producer| async move {
                let run = AssertUnwindSafe(producer.produce(subject_id, context)).catch_unwind();
                (producer, tokio::time::timeout(timeout, run).await)
            });

            let mut scores = Vec::with_capacity(producers.len());
            for (producer, result) in join_all(runs).await {
                let stage = producer.stage();
                match result {
                    Ok(Ok(Ok(mut score))) => {
                        if score.stage != stage {
                            warn!(stage = %stage, reported = %score.stage, "Stage name mismatch; using producer name");
                            score.stage = stage.to_string();
                        }
                        scores.push(score);
                    }
                    Ok(Ok(Err(e))) => warn!(stage = %stage, error = %e, "Stage failed; treating as missing"),
                    Ok(Err(_)) => warn!(stage = %stage, "Stage panicked; treating as missing"),
                    Err(_) => warn!(
                        stage = %stage,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "Stage timed out; treating as missing"
                    ),
                }
            }

            let outcome = self.aggregator.aggregate(&scores, table)?;

            for sink in &self.sinks {
                if let Err(e) = sink.publish_ensemble(subject_id, &outcome).await {
                    warn!(error = %e, "Report sink failed");
                }
            }

            Ok::<_, ConsensusError>(outcome)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{ProfileTable, stages};
    use crate::regime::Regime;
    use crate::sink::CollectingSink;
    use crate::strategy::{MajorityStrategy, StrategyParams, WeightedStrategy};
    use signal_core::{Agent, Direction, Verdict};
    use signal_runtime::{AgentDescriptor, AgentRegistry, RegistryEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedAgent {
        id: String,
        verdict: Option<Verdict>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedAgent {
        fn voting(id: &str, direction: Direction, confidence: f64) -> Self {
            Self {
                id: id.to_string(),
                verdict: Some(Verdict::new(direction, confidence, format!("{id} analysis"))),
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(id: &str) -> Self {
            Self {
                verdict: None,
                ..Self::voting(id, Direction::Neutral, 0.0)
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn counted(mut self, calls: &Arc<AtomicUsize>) -> Self {
            self.calls = Arc::clone(calls);
            self
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        async fn evaluate(&self, _subject_id: &str, _context: &AgentContext) -> signal_core::Result<Verdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.verdict
                .clone()
                .ok_or_else(|| signal_core::Error::ProcessingFailed("upstream unavailable".to_string()))
        }

        fn name(&self) -> &str {
            &self.id
        }
    }

    fn registry(agents: Vec<ScriptedAgent>) -> AgentRegistry {
        let registry = AgentRegistry::new();
        for agent in agents {
            let descriptor = AgentDescriptor::new(agent.id.clone());
            registry.register(descriptor, Arc::new(agent)).unwrap();
        }
        registry
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(
            EngineConfig::builder()
                .agent_timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    fn ctx() -> Arc<AgentContext> {
        Arc::new(AgentContext::new())
    }

    #[tokio::test]
    async fn test_one_slow_agent_among_five() {
        let registry = registry(vec![
            ScriptedAgent::voting("trend", Direction::Bullish, 0.8),
            ScriptedAgent::voting("momentum", Direction::Bullish, 0.7),
            ScriptedAgent::voting("news", Direction::Bullish, 0.6)
                .delayed(Duration::from_secs(30)),
            ScriptedAgent::voting("macro", Direction::Bearish, 0.6),
            ScriptedAgent::voting("value", Direction::Bullish, 0.9),
        ]);

        let report = engine()
            .run_consensus("AAPL", &registry.snapshot(), &MajorityStrategy, ctx())
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.participants(), 4);
        assert_eq!(report.failures.timeouts, 1);
        assert_eq!(report.failures.total(), 1);
        assert!(report.elapsed < Duration::from_secs(2));
        assert!(!report.empty_result_set);

        assert_eq!(report.consensus.direction, Direction::Bullish);
        assert!((report.consensus.confidence - 0.8).abs() < 1e-12);
        assert_eq!(report.consensus.agreement_fraction, 0.75);
        assert_eq!(report.outcomes[2].descriptor.id, "news");
        assert!(!report.outcomes[2].is_success());
    }

    #[tokio::test]
    async fn test_zero_agents_is_neutral_for_every_strategy() {
        let engine = engine();
        let snapshot = AgentRegistry::new().snapshot();

        for kind in StrategyKind::ALL {
            let report = engine
                .run_consensus_named("MSFT", &snapshot, kind.as_str(), ctx())
                .await
                .unwrap();
            assert_eq!(report.consensus.direction, Direction::Neutral);
            assert_eq!(report.consensus.confidence, 0.5);
            assert_eq!(report.consensus.agreement_fraction, 0.0);
            assert!(report.empty_result_set);
        }
    }

    #[tokio::test]
    async fn test_all_failures_is_empty_result_set() {
        let registry = registry(vec![
            ScriptedAgent::failing("a"),
            ScriptedAgent::failing("b"),
        ]);

        let report = engine()
            .run_consensus("TSLA", &registry.snapshot(), &WeightedStrategy::default(), ctx())
            .await
            .unwrap();

        assert!(report.empty_result_set);
        assert_eq!(report.failures.agent_errors, 2);
        assert_eq!(report.consensus.direction, Direction::Neutral);
        assert_eq!(report.consensus.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_same_inputs_same_consensus() {
        let registry = registry(vec![
            ScriptedAgent::voting("a", Direction::Bullish, 0.62),
            ScriptedAgent::voting("b", Direction::Bearish, 0.41),
            ScriptedAgent::voting("c", Direction::Bullish, 0.55),
        ]);
        let engine = engine();
        let snapshot = registry.snapshot();
        let strategy = StrategyKind::ConfidenceWeighted.build(&StrategyParams::default());

        let first = engine
            .run_consensus("NVDA", &snapshot, strategy.as_ref(), ctx())
            .await
            .unwrap();
        let second = engine
            .run_consensus("NVDA", &snapshot, strategy.as_ref(), ctx())
            .await
            .unwrap();

        assert_eq!(first.consensus, second.consensus);
        assert_ne!(first.round_id, second.round_id);
    }

    #[tokio::test]
    async fn test_recompute_uses_recorded_signals() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(vec![
            ScriptedAgent::voting("a", Direction::Bullish, 0.9).counted(&calls),
            ScriptedAgent::voting("b", Direction::Bullish, 0.9).counted(&calls),
            ScriptedAgent::voting("risk", Direction::Bearish, 0.85).counted(&calls),
        ]);

        let report = engine()
            .run_consensus("AMZN", &registry.snapshot(), &MajorityStrategy, ctx())
            .await
            .unwrap();
        assert_eq!(report.consensus.direction, Direction::Bullish);

        let veto = StrategyKind::Veto.build(&StrategyParams::default());
        let recomputed = report.recompute(veto.as_ref());
        assert_eq!(recomputed.direction, Direction::Bearish);
        assert_eq!(recomputed.confidence, 0.9);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_strategy_fails_before_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(vec![
            ScriptedAgent::voting("a", Direction::Bullish, 0.9).counted(&calls),
        ]);

        let err = engine()
            .run_consensus_named("AAPL", &registry.snapshot(), "plurality", ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, ConsensusError::UnknownStrategy(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent: Arc<dyn Agent> =
            Arc::new(ScriptedAgent::voting("a", Direction::Bullish, 0.9).counted(&calls));
        let bad = RegistrySnapshot::new(vec![RegistryEntry {
            descriptor: AgentDescriptor::new("a").with_weight(-1.0),
            agent,
        }]);

        let err = engine()
            .run_consensus("AAPL", &bad, &MajorityStrategy, ctx())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Core(signal_core::Error::InvalidWeight { .. })
        ));

        let err = engine()
            .run_consensus("  ", &AgentRegistry::new().snapshot(), &MajorityStrategy, ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidSubject(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_default_strategy_and_sink() {
        let sink = Arc::new(CollectingSink::new());
        let engine = ConsensusEngine::new(
            EngineConfig::builder()
                .default_strategy(StrategyKind::Weighted)
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_sink(sink.clone());

        let registry = registry(vec![
            ScriptedAgent::voting("a", Direction::Bullish, 0.6),
            ScriptedAgent::voting("b", Direction::Neutral, 0.9),
        ]);
        let report = engine
            .run_default_consensus("GOOG", &registry.snapshot(), ctx())
            .await
            .unwrap();

        assert_eq!(report.consensus.strategy, "weighted");
        assert_eq!(report.consensus.direction, Direction::Bullish);
        assert_eq!(report.signal.produced_by(), "consensus:weighted");

        let published = sink.reports();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].round_id, report.round_id);
    }

    struct FixedStage {
        stage: &'static str,
        direction: Direction,
        delay: Duration,
        fail: bool,
        panic: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FixedStage {
        fn new(stage: &'static str, direction: Direction) -> Self {
            Self {
                stage,
                direction,
                delay: Duration::ZERO,
                fail: false,
                panic: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl StageProducer for FixedStage {
        fn stage(&self) -> &str {
            self.stage
        }

        async fn produce(&self, _subject_id: &str, _context: &AgentContext) -> signal_core::Result<StageScore> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("{} stage crashed", self.stage);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(signal_core::Error::ProcessingFailed("model offline".to_string()));
            }
            let signal = Signal::new(self.direction, 0.8, format!("{} stage", self.stage), self.stage)?;
            Ok(StageScore::from_signal(self.stage, signal))
        }
    }

    #[tokio::test]
    async fn test_stage_pipeline_degrades_on_timeout() {
        let engine = ConsensusEngine::new(
            EngineConfig::builder()
                .stage_timeout(Duration::from_millis(100))
                .build()
                .unwrap(),
        )
        .unwrap();

        let producers: Vec<Arc<dyn StageProducer>> = vec![
            Arc::new(FixedStage::new(stages::QUANTITATIVE, Direction::Bullish)),
            Arc::new(FixedStage::new(stages::QUALITATIVE, Direction::Bullish)),
            Arc::new(FixedStage {
                delay: Duration::from_secs(10),
                ..FixedStage::new(stages::SYNTHESIS, Direction::Bearish)
            }),
        ];

        let outcome = engine
            .run_stage_pipeline("AAPL", &producers, &ProfileTable::analysis(), &AgentContext::new())
            .await
            .unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.missing_stages, vec!["synthesis".to_string()]);
        assert_eq!(outcome.direction(), Direction::Bullish);
        assert_eq!(outcome.score, 1.0);
    }

    #[tokio::test]
    async fn test_stage_pipeline_unconfigured_after_failure() {
        let producers: Vec<Arc<dyn StageProducer>> = vec![
            Arc::new(FixedStage {
                fail: true,
                ..FixedStage::new(stages::QUANTITATIVE, Direction::Bullish)
            }),
            Arc::new(FixedStage::new(stages::QUALITATIVE, Direction::Bullish)),
            Arc::new(FixedStage::new(stages::SYNTHESIS, Direction::Bullish)),
        ];

        let err = engine()
            .run_stage_pipeline("AAPL", &producers, &ProfileTable::analysis(), &AgentContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::UnconfiguredStageSet(_)));
    }

    #[tokio::test]
    async fn test_stage_pipeline_survives_panic_and_publishes() {
        let sink = Arc::new(CollectingSink::new());
        let engine = engine().with_sink(sink.clone());
        let producers: Vec<Arc<dyn StageProducer>> = vec![
            Arc::new(FixedStage::new(stages::QUANTITATIVE, Direction::Bearish)),
            Arc::new(FixedStage::new(stages::QUALITATIVE, Direction::Bearish)),
            Arc::new(FixedStage {
                panic: true,
                ..FixedStage::new(stages::SYNTHESIS, Direction::Bullish)
            }),
        ];

        let outcome = engine
            .run_stage_pipeline("MSFT", &producers, &ProfileTable::analysis(), &AgentContext::new())
            .await
            .unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.profile, "analysis_without_synthesis");
        assert_eq!(outcome.missing_stages, vec!["synthesis".to_string()]);
        assert_eq!(outcome.direction(), Direction::Bearish);

        let published = sink.ensembles();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "MSFT");
        assert_eq!(published[0].1, outcome);
        assert!(sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_stage_pipeline_rejects_duplicate_producers() {
        let first = FixedStage::new(stages::QUANTITATIVE, Direction::Bullish);
        let second = FixedStage::new(stages::QUANTITATIVE, Direction::Bearish);
        let calls = [first.calls.clone(), second.calls.clone()];
        let producers: Vec<Arc<dyn StageProducer>> = vec![
            Arc::new(first),
            Arc::new(FixedStage::new(stages::QUALITATIVE, Direction::Bullish)),
            Arc::new(second),
        ];

        let err = engine()
            .run_stage_pipeline("AAPL", &producers, &ProfileTable::analysis(), &AgentContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConsensusError::DuplicateStage(ref stage) if stage == "quantitative"));
        assert!(calls.iter().all(|count| count.load(Ordering::SeqCst) == 0));
    }

    #[test]
    fn test_regime_fills_market_regime_stage() {
        let signal = |direction| Signal::new(direction, 0.7, "stage", "stage").unwrap();
        let scores = vec![
            StageScore::from_signal(stages::ECONOMIC_INDICATORS, signal(Direction::Bullish)),
            StageScore::from_signal(stages::SECTOR_IMPACT, signal(Direction::Bullish)),
            StageScore::from_signal(stages::AI_SYNTHESIS, signal(Direction::Neutral)),
        ];
        let indicators = RegimeIndicators::new()
            .with_volatility_index(12.0)
            .with_growth_rate(3.5);

        let (regime, outcome) = engine()
            .run_regime_ensemble(&scores, &ProfileTable::macro_outlook(), &indicators)
            .unwrap();

        assert_eq!(regime.regime, Regime::Bull);
        // 0.35 + 0.20 + 0.25 + 0.20 * 0.5
        assert!((outcome.score - 0.9).abs() < 1e-9);
        assert_eq!(outcome.direction(), Direction::Bullish);
        assert!(!outcome.degraded);
        assert_eq!(outcome.contributions.len(), 4);
    }

    #[test]
    fn test_run_stage_ensemble_matches_aggregator() {
        let signal = |direction| Signal::new(direction, 0.6, "stage", "stage").unwrap();
        let scores = vec![
            StageScore::from_signal(stages::QUANTITATIVE, signal(Direction::Bearish)),
            StageScore::from_signal(stages::QUALITATIVE, signal(Direction::Bearish)),
        ];
        let engine = engine();
        let outcome = engine
            .run_stage_ensemble(&scores, &ProfileTable::analysis())
            .unwrap();
        assert_eq!(outcome.direction(), Direction::Bearish);
        assert_eq!(outcome.score, 0.0);
        assert!((outcome.confidence - 0.6).abs() < 1e-12);
    }
}
