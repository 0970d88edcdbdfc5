use super::{ConsensusResult, ConsensusStrategy, Distribution, Vote};
use signal_core::Direction;

/// Signed, weight-scaled sum of confidences
///
/// `score = Σ weight × confidence × multiplier(direction)`. Scores above the
/// threshold are bullish, below its negation bearish, anything between is
/// neutral. Confidence is `|score|` capped at 1.
#[derive(Debug, Clone, Copy)]
pub struct WeightedStrategy {
    threshold: f64,
}

impl WeightedStrategy {
    pub const NAME: &'static str = "weighted";
    pub const DEFAULT_THRESHOLD: f64 = 0.3;

    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for WeightedStrategy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl ConsensusStrategy for WeightedStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reduce(&self, votes: &[Vote]) -> ConsensusResult {
        if votes.is_empty() {
            return ConsensusResult::empty(Self::NAME);
        }

        let distribution = Distribution::from_votes(votes);
        let total_weight: f64 = votes.iter().map(|vote| vote.weight).sum();
        if total_weight <= 0.0 {
            return ConsensusResult::neutral(
                Self::NAME,
                distribution,
                "all agent weights are zero",
            );
        }

        let score: f64 = votes
            .iter()
            .map(|vote| vote.weight * vote.confidence() * vote.direction().multiplier())
            .sum();

        let direction = if score > self.threshold {
            Direction::Bullish
        } else if score < -self.threshold {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        ConsensusResult::new(
            Self::NAME,
            direction,
            score.abs().min(1.0),
            distribution,
            format!(
                "weighted score {score:+.3} against threshold {:.2}",
                self.threshold
            ),
        )
        .with_score(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::weighted_vote;
    use Direction::{Bearish, Bullish, Neutral};

    #[test]
    fn test_opposing_votes_cancel() {
        let result = WeightedStrategy::default().reduce(&[
            weighted_vote("a", 0.5, Bullish, 0.8),
            weighted_vote("b", 0.5, Bearish, 0.8),
        ]);
        assert_eq!(result.direction, Neutral);
        assert_eq!(result.score, Some(0.0));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_threshold_boundaries() {
        let strategy = WeightedStrategy::default();

        let result = strategy.reduce(&[weighted_vote("a", 1.0, Bullish, 0.35)]);
        assert_eq!(result.direction, Bullish);
        assert!((result.confidence - 0.35).abs() < 1e-12);

        // exactly at the threshold stays neutral
        let result = strategy.reduce(&[weighted_vote("a", 1.0, Bearish, 0.3)]);
        assert_eq!(result.direction, Neutral);

        let result = strategy.reduce(&[weighted_vote("a", 1.0, Bearish, 0.31)]);
        assert_eq!(result.direction, Bearish);
    }

    #[test]
    fn test_confidence_is_capped() {
        let result = WeightedStrategy::default().reduce(&[
            weighted_vote("a", 2.0, Bullish, 0.9),
            weighted_vote("b", 1.5, Bullish, 0.8),
        ]);
        assert_eq!(result.direction, Bullish);
        assert_eq!(result.confidence, 1.0);
        assert!(result.score.unwrap() > 1.0);
    }

    #[test]
    fn test_zero_total_weight_is_neutral() {
        let result = WeightedStrategy::default().reduce(&[
            weighted_vote("a", 0.0, Bullish, 0.9),
            weighted_vote("b", 0.0, Bullish, 0.9),
        ]);
        assert_eq!(result.direction, Neutral);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.agreement_fraction, 1.0);
    }

    #[test]
    fn test_heavy_agent_dominates() {
        let result = WeightedStrategy::default().reduce(&[
            weighted_vote("a", 3.0, Bearish, 0.9),
            weighted_vote("b", 1.0, Bullish, 0.9),
            weighted_vote("c", 1.0, Bullish, 0.9),
        ]);
        assert_eq!(result.direction, Bearish);
        assert!((result.score.unwrap() + 0.9).abs() < 1e-9);
        assert!((result.agreement_fraction - 2.0 / 3.0).abs() < 1e-12);
    }
}
