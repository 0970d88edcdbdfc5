use super::{ConsensusResult, ConsensusStrategy, Vote};

/// Restricts another strategy to votes from agents carrying a tag
///
/// Lets one registry answer narrower questions, such as "what do the
/// macro agents think", without a second registry.
pub struct TagFilter {
    tag: String,
    name: String,
    inner: Box<dyn ConsensusStrategy>,
}

impl TagFilter {
    pub fn new(tag: impl Into<String>, inner: Box<dyn ConsensusStrategy>) -> Self {
        let tag = tag.into();
        let name = format!("{}[{tag}]", inner.name());
        Self { tag, name, inner }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl ConsensusStrategy for TagFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn reduce(&self, votes: &[Vote]) -> ConsensusResult {
        let selected: Vec<Vote> = votes
            .iter()
            .filter(|vote| vote.tags.contains(&self.tag))
            .cloned()
            .collect();

        let mut result = self.inner.reduce(&selected);
        result.strategy.clone_from(&self.name);
        result
    }
}
