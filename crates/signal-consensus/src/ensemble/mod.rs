//! Weighted stage ensembles
//!
//! An analysis is split into named stages (technical indicators, macro
//! data, an LLM synthesis and so on). Each stage reports a [`StageScore`];
//! the [`EnsembleAggregator`] combines them with the [`WeightProfile`] that
//! matches the set of stages that actually reported.

mod aggregator;
mod profile;

pub use aggregator::{DEFAULT_ZERO_AGREEMENT_FLOOR, EnsembleAggregator};
pub use profile::{ProfileTable, WeightProfile};

use crate::clamp_unit;
use crate::regime::Regime;
use serde::{Deserialize, Serialize};
use signal_core::{Direction, Signal};

/// Well-known stage names used by the preset profile tables
pub mod stages {
    pub const QUANTITATIVE: &str = "quantitative";
    pub const QUALITATIVE: &str = "qualitative";
    pub const SYNTHESIS: &str = "synthesis";

    pub const TREND: &str = "trend";
    pub const MOMENTUM: &str = "momentum";
    pub const VOLUME: &str = "volume";
    pub const VOLATILITY: &str = "volatility";
    pub const AI_PATTERN: &str = "ai_pattern";

    pub const ECONOMIC_INDICATORS: &str = "economic_indicators";
    pub const MARKET_REGIME: &str = "market_regime";
    pub const SECTOR_IMPACT: &str = "sector_impact";
    pub const AI_SYNTHESIS: &str = "ai_synthesis";
}

/// Composite score at or above which the ensemble is bullish
pub const BULLISH_THRESHOLD: f64 = 0.65;
/// Composite score at or below which the ensemble is bearish
pub const BEARISH_THRESHOLD: f64 = 0.35;

const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// How a stage's numeric score should be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// The score already lies on the bearish (0) to bullish (1) scale
    UnitInterval,
    /// The score is in the stage's own units; only the signal direction is used
    #[default]
    Native,
}

/// Output of one ensemble stage
///
/// Confidence is clamped to [0, 1], including when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StageScoreRecord")]
pub struct StageScore {
    pub stage: String,
    pub score: f64,
    pub scale: ScoreScale,
    pub signal: Signal,
    pub confidence: f64,
}

impl StageScore {
    /// A stage whose score is already on the unit scale
    pub fn unit(stage: impl Into<String>, score: f64, signal: Signal, confidence: f64) -> Self {
        Self {
            stage: stage.into(),
            score,
            scale: ScoreScale::UnitInterval,
            signal,
            confidence: clamp_unit(confidence),
        }
    }

    /// A stage with a score in its own units
    pub fn native(stage: impl Into<String>, score: f64, signal: Signal, confidence: f64) -> Self {
        Self {
            stage: stage.into(),
            score,
            scale: ScoreScale::Native,
            signal,
            confidence: clamp_unit(confidence),
        }
    }

    /// A stage described only by a signal
    pub fn from_signal(stage: impl Into<String>, signal: Signal) -> Self {
        let score = signal.direction().unit_value();
        let confidence = signal.confidence();
        Self::native(stage, score, signal, confidence)
    }

    /// Value on the bearish (0) to bullish (1) scale used for weighting
    pub fn directional_value(&self) -> f64 {
        match self.scale {
            ScoreScale::UnitInterval if self.score.is_finite() => self.score.clamp(0.0, 1.0),
            _ => self.signal.direction().unit_value(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.signal.direction()
    }
}

#[derive(Deserialize)]
struct StageScoreRecord {
    stage: String,
    score: f64,
    #[serde(default)]
    scale: ScoreScale,
    signal: Signal,
    confidence: f64,
}

impl From<StageScoreRecord> for StageScore {
    fn from(record: StageScoreRecord) -> Self {
        Self {
            stage: record.stage,
            score: record.score,
            scale: record.scale,
            signal: record.signal,
            confidence: clamp_unit(record.confidence),
        }
    }
}

/// Map a composite score onto a direction
///
/// Boundaries are inclusive: exactly 0.65 is bullish and exactly 0.35 is
/// bearish, with a small tolerance for floating-point noise.
pub fn classify_score(score: f64) -> Direction {
    classify_with(score, BULLISH_THRESHOLD, BEARISH_THRESHOLD)
}

pub(crate) fn classify_with(score: f64, bullish: f64, bearish: f64) -> Direction {
    if score >= bullish - BOUNDARY_TOLERANCE {
        Direction::Bullish
    } else if score <= bearish + BOUNDARY_TOLERANCE {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

/// What one stage added to the composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageContribution {
    pub stage: String,
    pub weight: f64,
    pub directional_value: f64,
    /// `weight × directional_value / total weight`
    pub contribution: f64,
    pub direction: Direction,
    pub confidence: f64,
    /// Whether the stage's direction matches the final direction
    pub agrees: bool,
}

/// Result of combining stage scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutcome {
    pub signal: Signal,
    /// Composite score in [0, 1]
    pub score: f64,
    /// Final confidence after agreement adjustment
    pub confidence: f64,
    /// Confidence before agreement adjustment
    pub base_confidence: f64,
    /// Fraction of present stages agreeing with the final direction
    pub agreement_rate: f64,
    /// Name of the profile that was applied
    pub profile: String,
    /// True when a fallback profile had to be used
    pub degraded: bool,
    /// Stages of the primary profile that did not report
    pub missing_stages: Vec<String>,
    /// Regime the profile was selected for, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<Regime>,
    pub contributions: Vec<StageContribution>,
}

impl EnsembleOutcome {
    pub fn direction(&self) -> Direction {
        self.signal.direction()
    }
}
