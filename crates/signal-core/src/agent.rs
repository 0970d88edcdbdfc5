//! Core Agent trait definition

use crate::{AgentContext, Result, Verdict};
use async_trait::async_trait;

/// Capability that every scoring agent implements
///
/// Agents may be rule based, retrieval augmented or backed by an LLM call; the
/// engine only sees this one operation. The context is shared read-only with
/// every other agent of the round.
///
/// Returning [`crate::Error::InvalidOutput`] marks the result as malformed
/// output rather than an agent fault.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce a verdict for `subject_id`
    async fn evaluate(&self, subject_id: &str, context: &AgentContext) -> Result<Verdict>;

    /// Get the agent's name
    fn name(&self) -> &str;
}
