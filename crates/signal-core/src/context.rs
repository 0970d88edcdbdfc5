//! Read-only evaluation context shared by all agents in a round
//!
//! The `AgentContext` is built once by the caller, wrapped in an `Arc` and
//! handed to every agent of a round. It carries pre-fetched key-value data and
//! an optional [`DataSource`] for anything the caller did not pre-fetch.
//! Nothing in the context can be mutated once a round has started.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Well-known context keys for common market data
pub mod keys {
    /// Volatility index level (e.g. VIX)
    pub const VOLATILITY_INDEX: &str = "vix";
    /// Real GDP growth rate, percent
    pub const GROWTH_RATE: &str = "gdp_growth";
    /// Policy (fed funds) rate, percent
    pub const POLICY_RATE: &str = "fed_funds_rate";
    /// 10Y minus 2Y treasury spread, percentage points
    pub const YIELD_SPREAD: &str = "yield_spread";
}

/// Fetch capability implemented by data collaborators
///
/// Retries, caching and rate limiting belong to the implementation; agents
/// only see a value or a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch `key` for `subject_id`
    async fn fetch(&self, subject_id: &str, key: &str) -> Result<serde_json::Value>;
}

/// Context passed to agents during evaluation
///
/// # Example
///
/// ```
/// use signal_core::AgentContext;
///
/// let ctx = AgentContext::new()
///     .with_value("vix", serde_json::json!(14.2))
///     .with_value("sector", serde_json::json!("technology"));
///
/// assert_eq!(ctx.get("vix").and_then(|v| v.as_f64()), Some(14.2));
/// assert_eq!(ctx.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct AgentContext {
    data: HashMap<String, serde_json::Value>,
    source: Option<Arc<dyn DataSource>>,
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("data", &self.data)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl AgentContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    // =========== Builder Methods ===========

    /// Add a pre-fetched value
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Attach a data source for values that were not pre-fetched
    pub fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    // =========== Read Access ===========

    /// Get a pre-fetched value
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a pre-fetched value as a specific type
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => {
                let typed = serde_json::from_value(value.clone()).map_err(|e| {
                    Error::ProcessingFailed(format!("Failed to deserialize context value {key}: {e}"))
                })?;
                Ok(Some(typed))
            }
        }
    }

    /// Check if a key was pre-fetched
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn has_data_source(&self) -> bool {
        self.source.is_some()
    }

    /// Number of pre-fetched entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resolve `key` for `subject_id`
    ///
    /// Pre-fetched values win; otherwise the data source is asked. Without
    /// either, the result is [`Error::DataUnavailable`].
    pub async fn fetch(&self, subject_id: &str, key: &str) -> Result<serde_json::Value> {
        if let Some(value) = self.data.get(key) {
            return Ok(value.clone());
        }

        match &self.source {
            Some(source) => {
                tracing::debug!(subject = %subject_id, key = %key, "Fetching from data source");
                source.fetch(subject_id, key).await
            }
            None => Err(Error::DataUnavailable {
                subject: subject_id.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Resolve `key` and read it as a number
    pub async fn fetch_f64(&self, subject_id: &str, key: &str) -> Result<f64> {
        let value = self.fetch(subject_id, key).await?;
        value.as_f64().ok_or_else(|| {
            Error::ProcessingFailed(format!("Context value {key} is not a number: {value}"))
        })
    }
}
