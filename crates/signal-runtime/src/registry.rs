//! Agent registry with runtime enable/disable and weights

use serde::{Deserialize, Serialize};
use signal_core::{Agent, Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Weight given to agents registered without an explicit weight
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Registration record for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Stable, unique identifier
    pub id: String,
    pub display_name: String,
    /// Non-negative weight used by weighted strategies
    pub weight: f64,
    pub enabled: bool,
    /// Informational labels; only tag-filtering strategies read them
    pub tags: BTreeSet<String>,
    /// Overrides the executor's default per-agent timeout
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl AgentDescriptor {
    /// Create an enabled descriptor with the default weight
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            weight: DEFAULT_WEIGHT,
            enabled: true,
            tags: BTreeSet::new(),
            timeout: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register the agent in the disabled state
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Reject negative, infinite and NaN weights
pub fn validate_weight(id: &str, weight: f64) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidWeight {
            id: id.to_string(),
            weight,
        })
    }
}

/// A descriptor paired with the agent implementation it describes
#[derive(Clone)]
pub struct RegistryEntry {
    pub descriptor: AgentDescriptor,
    pub agent: Arc<dyn Agent>,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("descriptor", &self.descriptor)
            .field("agent", &self.agent.name())
            .finish()
    }
}

/// Copy of the enabled agents at one point in time, in registration order
///
/// Later registry mutations do not affect a snapshot, so a round in flight
/// always sees a consistent agent set.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: Vec<RegistryEntry>,
}

impl RegistrySnapshot {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check weights and id uniqueness before any work is dispatched
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for descriptor in self.descriptors() {
            validate_weight(&descriptor.id, descriptor.weight)?;
            if !seen.insert(descriptor.id.as_str()) {
                return Err(Error::DuplicateAgent(descriptor.id.clone()));
            }
        }
        Ok(())
    }
}

/// Registry for managing agents
///
/// Registration order is preserved; several consensus strategies break ties
/// by iteration order, so listings are always deterministic.
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl AgentRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<RegistryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RegistryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an agent; fails if the id is taken or the weight is invalid
    pub fn register(&self, descriptor: AgentDescriptor, agent: Arc<dyn Agent>) -> Result<()> {
        validate_weight(&descriptor.id, descriptor.weight)?;

        let mut entries = self.write();
        if entries.iter().any(|entry| entry.descriptor.id == descriptor.id) {
            return Err(Error::DuplicateAgent(descriptor.id));
        }

        tracing::debug!(
            agent_id = %descriptor.id,
            weight = descriptor.weight,
            enabled = descriptor.enabled,
            "Registering agent"
        );
        entries.push(RegistryEntry { descriptor, agent });
        Ok(())
    }

    /// Remove an agent; rounds already holding a snapshot keep their copy
    pub fn unregister(&self, id: &str) -> Result<AgentDescriptor> {
        let mut entries = self.write();
        let index = entries
            .iter()
            .position(|entry| entry.descriptor.id == id)
            .ok_or_else(|| Error::UnknownAgent(id.to_string()))?;
        Ok(entries.remove(index).descriptor)
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut AgentDescriptor),
    {
        let mut entries = self.write();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.descriptor.id == id)
            .ok_or_else(|| Error::UnknownAgent(id.to_string()))?;
        apply(&mut entry.descriptor);
        Ok(())
    }

    /// Enable an agent (idempotent)
    pub fn enable(&self, id: &str) -> Result<()> {
        self.update(id, |descriptor| descriptor.enabled = true)
    }

    /// Disable an agent (idempotent)
    pub fn disable(&self, id: &str) -> Result<()> {
        self.update(id, |descriptor| descriptor.enabled = false)
    }

    pub fn set_weight(&self, id: &str, weight: f64) -> Result<()> {
        validate_weight(id, weight)?;
        self.update(id, |descriptor| descriptor.weight = weight)
    }

    pub fn set_tags<I, S>(&self, id: &str, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        self.update(id, |descriptor| descriptor.tags = tags)
    }

    /// Get a copy of an agent's descriptor
    pub fn descriptor(&self, id: &str) -> Option<AgentDescriptor> {
        self.read()
            .iter()
            .find(|entry| entry.descriptor.id == id)
            .map(|entry| entry.descriptor.clone())
    }

    /// All descriptors, enabled or not, in registration order
    pub fn list(&self) -> Vec<AgentDescriptor> {
        self.read()
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Enabled descriptors in registration order
    pub fn list_enabled(&self) -> Vec<AgentDescriptor> {
        self.read()
            .iter()
            .filter(|entry| entry.descriptor.enabled)
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Copy the enabled agents for an execution round
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(
            self.read()
                .iter()
                .filter(|entry| entry.descriptor.enabled)
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signal_core::{AgentContext, Verdict};

    struct StaticAgent(&'static str);

    #[async_trait]
    impl Agent for StaticAgent {
        async fn evaluate(&self, _subject_id: &str, _context: &AgentContext) -> Result<Verdict> {
            Ok(Verdict::neutral(0.5, "static"))
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn registry_with(ids: &[&'static str]) -> AgentRegistry {
        let registry = AgentRegistry::new();
        for &id in ids {
            registry
                .register(AgentDescriptor::new(id), Arc::new(StaticAgent(id)))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let registry = registry_with(&["trend"]);
        let err = registry
            .register(AgentDescriptor::new("trend"), Arc::new(StaticAgent("trend")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAgent(id) if id == "trend"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_bad_weight() {
        let registry = AgentRegistry::new();
        for weight in [-0.1, f64::NAN, f64::INFINITY] {
            let result = registry.register(
                AgentDescriptor::new("value").with_weight(weight),
                Arc::new(StaticAgent("value")),
            );
            assert!(matches!(result, Err(Error::InvalidWeight { .. })));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_enable_disable_idempotent() {
        let registry = registry_with(&["a", "b", "c"]);

        registry.disable("b").unwrap();
        registry.disable("b").unwrap();
        let enabled: Vec<String> = registry.list_enabled().into_iter().map(|d| d.id).collect();
        assert_eq!(enabled, vec!["a", "c"]);

        registry.enable("b").unwrap();
        registry.enable("b").unwrap();
        let enabled: Vec<String> = registry.list_enabled().into_iter().map(|d| d.id).collect();
        assert_eq!(enabled, vec!["a", "b", "c"]);

        assert!(matches!(registry.enable("zzz"), Err(Error::UnknownAgent(_))));
    }

    #[test]
    fn test_listing_keeps_registration_order() {
        let registry = registry_with(&["zeta", "alpha", "mid"]);
        let ids: Vec<String> = registry.list().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_set_weight_and_tags() {
        let registry = registry_with(&["a"]);
        registry.set_weight("a", 2.5).unwrap();
        registry.set_tags("a", ["technical", "fast"]).unwrap();

        let descriptor = registry.descriptor("a").unwrap();
        assert_eq!(descriptor.weight, 2.5);
        assert!(descriptor.has_tag("technical"));
        assert!(registry.set_weight("a", -1.0).is_err());
        assert_eq!(registry.descriptor("a").unwrap().weight, 2.5);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_changes() {
        let registry = registry_with(&["a", "b"]);
        let snapshot = registry.snapshot();

        registry.disable("a").unwrap();
        registry.set_weight("b", 9.0).unwrap();
        registry.unregister("b").unwrap();

        let ids: Vec<&str> = snapshot.descriptors().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(snapshot.entries()[1].descriptor.weight, DEFAULT_WEIGHT);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_validate() {
        let entry = |id: &str, weight: f64| RegistryEntry {
            descriptor: AgentDescriptor::new(id).with_weight(weight),
            agent: Arc::new(StaticAgent("x")),
        };

        assert!(RegistrySnapshot::new(vec![entry("a", 1.0), entry("b", 0.0)]).validate().is_ok());
        assert!(RegistrySnapshot::new(vec![entry("a", -2.0)]).validate().is_err());
        assert!(RegistrySnapshot::new(vec![entry("a", 1.0), entry("a", 1.0)]).validate().is_err());
    }
}
