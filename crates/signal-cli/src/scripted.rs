//! Agents driven by a JSON script, for trying strategies without live models

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use signal_core::{Agent, AgentContext, Direction, Error, Result, Verdict};
use signal_runtime::{AgentDescriptor, AgentRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A scenario file: agents plus the context they share
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub subject: Option<String>,
    pub agents: Vec<AgentScript>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentScript {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    pub direction: Direction,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// When set, the agent fails with this message instead of voting
    #[serde(default)]
    pub fail: Option<String>,
}

fn default_weight() -> f64 {
    signal_runtime::registry::DEFAULT_WEIGHT
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Register every scripted agent, in file order
    pub fn registry(&self) -> anyhow::Result<AgentRegistry> {
        let registry = AgentRegistry::new();
        for script in &self.agents {
            let mut descriptor = AgentDescriptor::new(script.id.clone()).with_weight(script.weight);
            for tag in &script.tags {
                descriptor = descriptor.with_tag(tag.clone());
            }
            if let Some(ms) = script.timeout_ms {
                descriptor = descriptor.with_timeout(Duration::from_millis(ms));
            }
            if script.enabled == Some(false) {
                descriptor = descriptor.disabled();
            }
            registry.register(descriptor, Arc::new(ScriptedAgent::new(script.clone())))?;
        }
        Ok(registry)
    }

    pub fn context(&self) -> AgentContext {
        self.context
            .iter()
            .fold(AgentContext::new(), |ctx, (key, value)| {
                ctx.with_value(key.clone(), value.clone())
            })
    }
}

pub struct ScriptedAgent {
    script: AgentScript,
}

impl ScriptedAgent {
    pub fn new(script: AgentScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn evaluate(&self, subject_id: &str, _context: &AgentContext) -> Result<Verdict> {
        if self.script.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.script.delay_ms)).await;
        }

        if let Some(message) = &self.script.fail {
            return Err(Error::ProcessingFailed(message.clone()));
        }

        let reasoning = self
            .script
            .reasoning
            .clone()
            .unwrap_or_else(|| format!("{} scripted {} on {subject_id}", self.script.id, self.script.direction));
        Ok(Verdict::new(self.script.direction, self.script.confidence, reasoning))
    }

    fn name(&self) -> &str {
        &self.script.id
    }
}
