use super::{ConsensusResult, ConsensusStrategy, Distribution, Vote};
use signal_core::Direction;

const TIE_TOLERANCE: f64 = 1e-12;

/// Direction with the largest summed confidence
///
/// A tie for the largest sum is neutral. Confidence is the returned
/// direction's share of the total confidence mass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceWeightedStrategy;

impl ConfidenceWeightedStrategy {
    pub const NAME: &'static str = "confidence_weighted";
}

impl ConsensusStrategy for ConfidenceWeightedStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reduce(&self, votes: &[Vote]) -> ConsensusResult {
        if votes.is_empty() {
            return ConsensusResult::empty(Self::NAME);
        }

        let distribution = Distribution::from_votes(votes);
        let mass = |direction: Direction| -> f64 {
            votes
                .iter()
                .filter(|vote| vote.direction() == direction)
                .map(Vote::confidence)
                .sum()
        };
        let sums = Direction::ALL.map(|direction| (direction, mass(direction)));
        let total: f64 = sums.iter().map(|(_, sum)| sum).sum();

        if total <= 0.0 {
            return ConsensusResult::neutral(
                Self::NAME,
                distribution,
                "every agent reported zero confidence",
            );
        }

        let top = sums.iter().map(|(_, sum)| *sum).fold(f64::MIN, f64::max);
        let leaders: Vec<Direction> = sums
            .iter()
            .filter(|(_, sum)| (top - sum).abs() <= TIE_TOLERANCE)
            .map(|(direction, _)| *direction)
            .collect();

        let direction = match leaders.as_slice() {
            [single] => *single,
            _ => Direction::Neutral,
        };
        let share = mass(direction) / total;

        let rationale = if leaders.len() > 1 {
            format!("tied confidence mass {top:.3} across {} directions", leaders.len())
        } else {
            format!("{direction} holds {:.0}% of confidence mass", share * 100.0)
        };

        ConsensusResult::new(Self::NAME, direction, share, distribution, rationale)
    }
}
