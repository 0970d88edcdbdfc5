use super::{ConsensusResult, ConsensusStrategy, Distribution, Vote};
use signal_core::Direction;

/// Strict majority of votes, regardless of weight
///
/// Confidence is the mean confidence of the winning direction's votes. With
/// no direction above half, the result is neutral at 0.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityStrategy;

impl MajorityStrategy {
    pub const NAME: &'static str = "majority";

    pub(crate) fn reduce_as(name: &str, votes: &[Vote]) -> ConsensusResult {
        if votes.is_empty() {
            return ConsensusResult::empty(name);
        }

        let distribution = Distribution::from_votes(votes);
        let total = distribution.total();

        let winner = Direction::ALL
            .into_iter()
            .find(|&direction| distribution.count(direction) * 2 > total);

        match winner {
            Some(direction) => {
                let confidences: Vec<f64> = votes
                    .iter()
                    .filter(|vote| vote.direction() == direction)
                    .map(Vote::confidence)
                    .collect();
                let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
                ConsensusResult::new(
                    name,
                    direction,
                    mean,
                    distribution,
                    format!(
                        "{} of {total} agents {direction}",
                        distribution.count(direction)
                    ),
                )
            }
            None => ConsensusResult::neutral(
                name,
                distribution,
                format!(
                    "no majority among {total} agents ({} bullish, {} bearish, {} neutral)",
                    distribution.bullish, distribution.bearish, distribution.neutral
                ),
            ),
        }
    }
}

impl ConsensusStrategy for MajorityStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reduce(&self, votes: &[Vote]) -> ConsensusResult {
        Self::reduce_as(Self::NAME, votes)
    }
}
