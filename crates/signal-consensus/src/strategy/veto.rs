use super::{ConsensusResult, ConsensusStrategy, Distribution, MajorityStrategy, Vote};
use signal_core::Direction;

/// Any sufficiently confident bearish vote vetoes the round
///
/// Only bearish votes can veto. Without a veto, the votes fall through to
/// [`MajorityStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct VetoStrategy {
    threshold: f64,
    veto_confidence: f64,
}

impl VetoStrategy {
    pub const NAME: &'static str = "veto";

    pub fn new(threshold: f64, veto_confidence: f64) -> Self {
        Self {
            threshold,
            veto_confidence,
        }
    }
}

impl Default for VetoStrategy {
    fn default() -> Self {
        Self::new(0.8, 0.9)
    }
}

impl ConsensusStrategy for VetoStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reduce(&self, votes: &[Vote]) -> ConsensusResult {
        let veto = votes.iter().find(|vote| {
            vote.direction() == Direction::Bearish && vote.confidence() > self.threshold
        });

        match veto {
            Some(vote) => {
                tracing::debug!(agent = %vote.agent_id, confidence = vote.confidence(), "Bearish veto");
                ConsensusResult::new(
                    Self::NAME,
                    Direction::Bearish,
                    self.veto_confidence,
                    Distribution::from_votes(votes),
                    format!(
                        "vetoed by {} at confidence {:.2}",
                        vote.agent_id,
                        vote.confidence()
                    ),
                )
            }
            None => MajorityStrategy::reduce_as(Self::NAME, votes),
        }
    }
}
