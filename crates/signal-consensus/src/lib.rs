//! Signal consensus and ensemble aggregation
//!
//! This crate reduces many agent signals into one recommendation. It includes:
//!
//! - Consensus strategies: majority, weighted, confidence-weighted and
//!   bearish veto, plus a tag filter that wraps any of them
//! - A generic weighted-stage ensemble aggregator with explicit weight
//!   profiles keyed by the set of available stages
//! - A voting regime detector whose output can feed stage weighting
//! - [`ConsensusEngine`], which ties the registry snapshot, the concurrent
//!   executor and a strategy into one call
//!
//! # Example
//!
//! ```rust,ignore
//! use signal_consensus::{ConsensusEngine, EngineConfig, StrategyKind};
//! use signal_core::AgentContext;
//! use signal_runtime::AgentRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = AgentRegistry::new();
//!     // registry.register(AgentDescriptor::new("trend"), Arc::new(TrendAgent))?;
//!
//!     let engine = ConsensusEngine::new(EngineConfig::default())?;
//!     let strategy = StrategyKind::Weighted.build(&engine.config().strategy_params);
//!     let report = engine
//!         .run_consensus("AAPL", &registry.snapshot(), strategy.as_ref(), Arc::new(AgentContext::new()))
//!         .await?;
//!     println!("{} ({:.2})", report.consensus.direction, report.consensus.confidence);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod regime;
pub mod sink;
pub mod strategy;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{ConsensusEngine, ConsensusReport, StageProducer};
pub use ensemble::{
    EnsembleAggregator, EnsembleOutcome, ProfileTable, ScoreScale, StageContribution, StageScore,
    WeightProfile, classify_score,
};
pub use error::{ConsensusError, Result};
pub use regime::{Regime, RegimeDetector, RegimeIndicators, RegimeState, RegimeThresholds};
pub use sink::{CollectingSink, ReportSink, TracingSink};
pub use strategy::{
    ConfidenceWeightedStrategy, ConsensusResult, ConsensusStrategy, Distribution,
    MajorityStrategy, StrategyKind, StrategyParams, TagFilter, VetoStrategy, Vote,
    WeightedStrategy,
};

/// Clamp into [0, 1], mapping NaN to 0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
