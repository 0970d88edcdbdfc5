use super::{
    BEARISH_THRESHOLD, BULLISH_THRESHOLD, EnsembleOutcome, ProfileTable, StageContribution,
    StageScore, classify_with,
};
use crate::regime::Regime;
use crate::{ConsensusError, Result, clamp_unit};
use signal_core::{Direction, Signal};
use std::collections::BTreeSet;

/// Confidence used when no stage agrees with the final direction
pub const DEFAULT_ZERO_AGREEMENT_FLOOR: f64 = 0.05;

/// Combines stage scores into one signal
///
/// The composite score is the weight-normalised mean of each stage's
/// directional value. Confidence starts from the table's confidence stages
/// and is scaled by how many stages agree with the final direction.
#[derive(Debug, Clone, Copy)]
pub struct EnsembleAggregator {
    zero_agreement_floor: f64,
}

impl Default for EnsembleAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ZERO_AGREEMENT_FLOOR)
    }
}

impl EnsembleAggregator {
    pub fn new(zero_agreement_floor: f64) -> Self {
        Self {
            zero_agreement_floor: clamp_unit(zero_agreement_floor),
        }
    }

    pub fn zero_agreement_floor(&self) -> f64 {
        self.zero_agreement_floor
    }

    /// Aggregate with the profile that matches the reporting stages
    pub fn aggregate(&self, scores: &[StageScore], table: &ProfileTable) -> Result<EnsembleOutcome> {
        self.aggregate_in_regime(scores, table, None)
    }

    /// Aggregate, preferring profiles configured for `regime`
    pub fn aggregate_in_regime(
        &self,
        scores: &[StageScore],
        table: &ProfileTable,
        regime: Option<Regime>,
    ) -> Result<EnsembleOutcome> {
        let mut available = BTreeSet::new();
        for score in scores {
            if !available.insert(score.stage.as_str()) {
                return Err(ConsensusError::DuplicateStage(score.stage.clone()));
            }
        }

        let missing_stages: Vec<String> = table
            .primary()
            .stages()
            .filter(|stage| !available.contains(stage))
            .map(ToString::to_string)
            .collect();

        if scores.is_empty() {
            tracing::warn!(table = %table.name(), "No stages reported; returning neutral");
            return Ok(empty_outcome(table, missing_stages));
        }

        let profile = table.select(&available, regime)?;
        let degraded = !table.primary().matches(&available);

        let total_weight: f64 = scores
            .iter()
            .map(|s| profile.weight(&s.stage).unwrap_or(0.0))
            .sum();
        let score = if total_weight > 0.0 {
            clamp_unit(
                scores
                    .iter()
                    .map(|s| profile.weight(&s.stage).unwrap_or(0.0) * s.directional_value())
                    .sum::<f64>()
                    / total_weight,
            )
        } else {
            0.5
        };

        let direction = classify_with(score, BULLISH_THRESHOLD, BEARISH_THRESHOLD);
        let base_confidence = base_confidence(scores, table.confidence_stages());

        let agreeing = scores.iter().filter(|s| s.direction() == direction).count();
        let agreement_rate = agreeing as f64 / scores.len() as f64;
        let confidence = if agreeing == 0 {
            self.zero_agreement_floor
        } else {
            clamp_unit(base_confidence * agreement_rate)
        };

        let contributions = scores
            .iter()
            .map(|s| {
                let weight = profile.weight(&s.stage).unwrap_or(0.0);
                let value = s.directional_value();
                StageContribution {
                    stage: s.stage.clone(),
                    weight,
                    directional_value: value,
                    contribution: if total_weight > 0.0 {
                        weight * value / total_weight
                    } else {
                        0.0
                    },
                    direction: s.direction(),
                    confidence: s.confidence,
                    agrees: s.direction() == direction,
                }
            })
            .collect();

        if degraded {
            tracing::warn!(
                table = %table.name(),
                profile = %profile.name(),
                missing = ?missing_stages,
                "Stages missing; using fallback weights"
            );
        }

        tracing::debug!(
            table = %table.name(),
            profile = %profile.name(),
            score,
            direction = %direction,
            confidence,
            agreement_rate,
            "Ensemble aggregated"
        );

        let reasoning = format!(
            "{} ensemble score {score:.3} ({direction}); {agreeing} of {} stages agree",
            table.name(),
            scores.len()
        );

        Ok(EnsembleOutcome {
            signal: Signal::derived(direction, confidence, reasoning, format!("ensemble:{}", table.name())),
            score,
            confidence,
            base_confidence,
            agreement_rate,
            profile: profile.name().to_string(),
            degraded,
            missing_stages,
            regime: profile.regime(),
            contributions,
        })
    }
}

/// Mean confidence of the present confidence stages, else of every stage
fn base_confidence(scores: &[StageScore], confidence_stages: &[String]) -> f64 {
    let preferred: Vec<f64> = scores
        .iter()
        .filter(|s| confidence_stages.iter().any(|name| name == &s.stage))
        .map(|s| s.confidence)
        .collect();

    let pool: Vec<f64> = if preferred.is_empty() {
        scores.iter().map(|s| s.confidence).collect()
    } else {
        preferred
    };

    if pool.is_empty() {
        0.0
    } else {
        pool.iter().sum::<f64>() / pool.len() as f64
    }
}

fn empty_outcome(table: &ProfileTable, missing_stages: Vec<String>) -> EnsembleOutcome {
    EnsembleOutcome {
        signal: Signal::derived(
            Direction::Neutral,
            0.5,
            format!("no {} stages reported", table.name()),
            format!("ensemble:{}", table.name()),
        ),
        score: 0.5,
        confidence: 0.5,
        base_confidence: 0.0,
        agreement_rate: 0.0,
        profile: table.primary().name().to_string(),
        degraded: true,
        missing_stages,
        regime: None,
        contributions: Vec::new(),
    }
}
