//! Configuration for the consensus engine

use crate::ensemble::DEFAULT_ZERO_AGREEMENT_FLOOR;
use crate::error::{ConsensusError, Result};
use crate::regime::RegimeThresholds;
use crate::strategy::{StrategyKind, StrategyParams};
use serde::{Deserialize, Serialize};
use signal_runtime::ExecutorConfig;
use signal_runtime::executor::DEFAULT_AGENT_TIMEOUT;
use std::path::Path;
use std::time::Duration;

pub const ENV_AGENT_TIMEOUT_SECS: &str = "CONSENSUS_AGENT_TIMEOUT_SECS";
pub const ENV_STRATEGY: &str = "CONSENSUS_STRATEGY";
pub const ENV_MAX_CONCURRENCY: &str = "CONSENSUS_MAX_CONCURRENCY";
pub const ENV_ZERO_AGREEMENT_FLOOR: &str = "CONSENSUS_ZERO_AGREEMENT_FLOOR";

/// Configuration for consensus and ensemble runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for agents without their own override
    pub agent_timeout: Duration,

    /// Timeout for each stage producer in a stage pipeline
    pub stage_timeout: Duration,

    /// Maximum agents evaluating at once (`None` = unbounded)
    pub max_concurrency: Option<usize>,

    /// Strategy used when the caller does not name one
    pub default_strategy: StrategyKind,

    /// Thresholds for the weighted and veto strategies
    pub strategy_params: StrategyParams,

    /// Ensemble confidence when no stage agrees with the final direction
    pub zero_agreement_floor: f64,

    /// Indicator cut-offs for regime detection
    pub regime_thresholds: RegimeThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
            stage_timeout: DEFAULT_AGENT_TIMEOUT,
            max_concurrency: None,
            default_strategy: StrategyKind::Majority,
            strategy_params: StrategyParams::default(),
            zero_agreement_floor: DEFAULT_ZERO_AGREEMENT_FLOOR,
            regime_thresholds: RegimeThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load a JSON configuration file; absent fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded engine config");
        Ok(config)
    }

    /// Apply `CONSENSUS_*` environment variables
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, such as the environment
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_AGENT_TIMEOUT_SECS) {
            let secs: f64 = parse_var(ENV_AGENT_TIMEOUT_SECS, &raw)?;
            self.agent_timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
                ConsensusError::ConfigError(format!("{ENV_AGENT_TIMEOUT_SECS}: {e}"))
            })?;
        }

        if let Some(raw) = lookup(ENV_STRATEGY) {
            self.default_strategy = raw.parse()?;
        }

        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            let limit: usize = parse_var(ENV_MAX_CONCURRENCY, &raw)?;
            self.max_concurrency = (limit > 0).then_some(limit);
        }

        if let Some(raw) = lookup(ENV_ZERO_AGREEMENT_FLOOR) {
            self.zero_agreement_floor = parse_var(ENV_ZERO_AGREEMENT_FLOOR, &raw)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout.is_zero() {
            return Err(ConsensusError::ConfigError(
                "agent_timeout must be greater than 0".to_string(),
            ));
        }

        if self.stage_timeout.is_zero() {
            return Err(ConsensusError::ConfigError(
                "stage_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrency == Some(0) {
            return Err(ConsensusError::ConfigError(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.zero_agreement_floor) {
            return Err(ConsensusError::ConfigError(format!(
                "zero_agreement_floor must be within [0, 1], got {}",
                self.zero_agreement_floor
            )));
        }

        let params = &self.strategy_params;
        if !params.weighted_threshold.is_finite() || params.weighted_threshold < 0.0 {
            return Err(ConsensusError::ConfigError(format!(
                "weighted_threshold must be a non-negative number, got {}",
                params.weighted_threshold
            )));
        }
        for (name, value) in [
            ("veto_threshold", params.veto_threshold),
            ("veto_confidence", params.veto_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConsensusError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        self.regime_thresholds.validate()
    }

    /// Executor settings derived from this configuration
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            agent_timeout: self.agent_timeout,
            max_concurrency: self.max_concurrency,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConsensusError::ConfigError(format!("{key}={raw:?}: {e}")))
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    agent_timeout: Option<Duration>,
    stage_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
    default_strategy: Option<StrategyKind>,
    strategy_params: Option<StrategyParams>,
    zero_agreement_floor: Option<f64>,
    regime_thresholds: Option<RegimeThresholds>,
}

impl EngineConfigBuilder {
    /// Set the default agent timeout
    pub fn agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = Some(timeout);
        self
    }

    /// Set the stage producer timeout
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Cap the number of agents evaluating at once
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn default_strategy(mut self, kind: StrategyKind) -> Self {
        self.default_strategy = Some(kind);
        self
    }

    pub fn strategy_params(mut self, params: StrategyParams) -> Self {
        self.strategy_params = Some(params);
        self
    }

    pub fn zero_agreement_floor(mut self, floor: f64) -> Self {
        self.zero_agreement_floor = Some(floor);
        self
    }

    pub fn regime_thresholds(mut self, thresholds: RegimeThresholds) -> Self {
        self.regime_thresholds = Some(thresholds);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            agent_timeout: self.agent_timeout.unwrap_or(defaults.agent_timeout),
            stage_timeout: self.stage_timeout.unwrap_or(defaults.stage_timeout),
            max_concurrency: self.max_concurrency.or(defaults.max_concurrency),
            default_strategy: self.default_strategy.unwrap_or(defaults.default_strategy),
            strategy_params: self.strategy_params.unwrap_or(defaults.strategy_params),
            zero_agreement_floor: self
                .zero_agreement_floor
                .unwrap_or(defaults.zero_agreement_floor),
            regime_thresholds: self.regime_thresholds.unwrap_or(defaults.regime_thresholds),
        };

        config.validate()?;
        Ok(config)
    }
}
