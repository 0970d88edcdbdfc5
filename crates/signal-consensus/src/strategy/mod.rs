//! Consensus strategies
//!
//! A strategy is a pure reduction from a list of votes to one
//! [`ConsensusResult`]. Strategies hold no state between calls, so the same
//! votes always reduce to the same result.

mod confidence;
mod majority;
mod tagged;
mod veto;
mod weighted;

pub use confidence::ConfidenceWeightedStrategy;
pub use majority::MajorityStrategy;
pub use tagged::TagFilter;
pub use veto::VetoStrategy;
pub use weighted::WeightedStrategy;

use crate::{ConsensusError, clamp_unit};
use serde::{Deserialize, Serialize};
use signal_core::{Direction, Signal};
use signal_runtime::AgentOutcome;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Confidence reported when no direction can be decided
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// One agent's signal together with the metadata strategies may read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: String,
    pub weight: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub signal: Signal,
}

impl Vote {
    pub fn new(agent_id: impl Into<String>, weight: f64, signal: Signal) -> Self {
        Self {
            agent_id: agent_id.into(),
            weight,
            tags: BTreeSet::new(),
            signal,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Collect votes from the successful outcomes of a round
    ///
    /// Failed agents are skipped; their count lives in the failure tally.
    pub fn from_outcomes(outcomes: &[AgentOutcome]) -> Vec<Vote> {
        outcomes
            .iter()
            .filter_map(|outcome| {
                outcome.signal().map(|signal| Vote {
                    agent_id: outcome.descriptor.id.clone(),
                    weight: outcome.descriptor.weight,
                    tags: outcome.descriptor.tags.clone(),
                    signal: signal.clone(),
                })
            })
            .collect()
    }

    pub fn direction(&self) -> Direction {
        self.signal.direction()
    }

    pub fn confidence(&self) -> f64 {
        self.signal.confidence()
    }
}

/// Vote counts per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

impl Distribution {
    pub fn from_votes(votes: &[Vote]) -> Self {
        let mut distribution = Self::default();
        for vote in votes {
            match vote.direction() {
                Direction::Bullish => distribution.bullish += 1,
                Direction::Bearish => distribution.bearish += 1,
                Direction::Neutral => distribution.neutral += 1,
            }
        }
        distribution
    }

    pub fn count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Bullish => self.bullish,
            Direction::Bearish => self.bearish,
            Direction::Neutral => self.neutral,
        }
    }

    pub fn total(&self) -> usize {
        self.bullish + self.bearish + self.neutral
    }

    /// Size of the largest direction bucket
    pub fn most_common_count(&self) -> usize {
        self.bullish.max(self.bearish).max(self.neutral)
    }

    /// Fraction of votes in the most common direction, 0 with no votes
    pub fn agreement_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.most_common_count() as f64 / total as f64
        }
    }
}

/// The reduced output of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Name of the strategy that produced this result
    pub strategy: String,
    pub direction: Direction,
    pub confidence: f64,
    /// Count of the most common direction over the number of votes
    pub agreement_fraction: f64,
    pub distribution: Distribution,
    /// Net signed score, for strategies that compute one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Short human-readable explanation of how the result was reached
    pub rationale: String,
}

impl ConsensusResult {
    pub fn new(
        strategy: impl Into<String>,
        direction: Direction,
        confidence: f64,
        distribution: Distribution,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            direction,
            confidence: clamp_unit(confidence),
            agreement_fraction: distribution.agreement_fraction(),
            distribution,
            score: None,
            rationale: rationale.into(),
        }
    }

    /// Neutral result at [`NEUTRAL_CONFIDENCE`]
    pub fn neutral(
        strategy: impl Into<String>,
        distribution: Distribution,
        rationale: impl Into<String>,
    ) -> Self {
        Self::new(
            strategy,
            Direction::Neutral,
            NEUTRAL_CONFIDENCE,
            distribution,
            rationale,
        )
    }

    /// Result for an empty vote list: neutral, 0.5, agreement 0
    pub fn empty(strategy: impl Into<String>) -> Self {
        Self::neutral(strategy, Distribution::default(), "no signals to aggregate")
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.distribution.total() == 0
    }

    /// Express the result as a signal attributed to the strategy
    pub fn to_signal(&self) -> Signal {
        Signal::derived(
            self.direction,
            self.confidence,
            self.rationale.clone(),
            format!("consensus:{}", self.strategy),
        )
    }
}

/// Reduces a list of votes to one consensus
pub trait ConsensusStrategy: Send + Sync {
    /// Strategy name used in results and logs
    fn name(&self) -> &str;

    /// Reduce `votes` to a consensus
    ///
    /// Must be total: an empty list yields [`ConsensusResult::empty`].
    fn reduce(&self, votes: &[Vote]) -> ConsensusResult;
}

/// Tunable parameters of the built-in strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// |score| above which the weighted strategy leaves neutral
    pub weighted_threshold: f64,
    /// Bearish confidence strictly above which a single vote vetoes
    pub veto_threshold: f64,
    /// Confidence reported when a veto fires
    pub veto_confidence: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            weighted_threshold: 0.3,
            veto_threshold: 0.8,
            veto_confidence: 0.9,
        }
    }
}

/// The built-in strategy set, selectable by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Majority,
    Weighted,
    ConfidenceWeighted,
    Veto,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Majority,
        StrategyKind::Weighted,
        StrategyKind::ConfidenceWeighted,
        StrategyKind::Veto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Majority => "majority",
            StrategyKind::Weighted => "weighted",
            StrategyKind::ConfidenceWeighted => "confidence_weighted",
            StrategyKind::Veto => "veto",
        }
    }

    /// Instantiate the strategy
    pub fn build(self, params: &StrategyParams) -> Box<dyn ConsensusStrategy> {
        match self {
            StrategyKind::Majority => Box::new(MajorityStrategy),
            StrategyKind::Weighted => Box::new(WeightedStrategy::new(params.weighted_threshold)),
            StrategyKind::ConfidenceWeighted => Box::new(ConfidenceWeightedStrategy),
            StrategyKind::Veto => Box::new(VetoStrategy::new(
                params.veto_threshold,
                params.veto_confidence,
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "majority" => Ok(StrategyKind::Majority),
            "weighted" => Ok(StrategyKind::Weighted),
            "confidence_weighted" | "confidence-weighted" => Ok(StrategyKind::ConfidenceWeighted),
            "veto" => Ok(StrategyKind::Veto),
            _ => Err(ConsensusError::UnknownStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Vote;
    use signal_core::{Direction, Signal};

    pub fn vote(id: &str, direction: Direction, confidence: f64) -> Vote {
        weighted_vote(id, 1.0, direction, confidence)
    }

    pub fn weighted_vote(id: &str, weight: f64, direction: Direction, confidence: f64) -> Vote {
        let signal = Signal::new(direction, confidence, format!("{id} says {direction}"), id)
            .expect("valid test signal");
        Vote::new(id, weight, signal)
    }
}
