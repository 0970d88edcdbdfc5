//! Market regime detection
//!
//! Each available indicator casts integer votes into four buckets (bull,
//! bear, risk-on, risk-off). The fullest bucket names the regime, and its
//! share of [`MAX_BUCKET_SCORE`] is the confidence. Missing indicators cast
//! no votes.

use crate::ensemble::{StageScore, stages};
use crate::{ConsensusError, Result, clamp_unit};
use serde::{Deserialize, Serialize};
use signal_core::context::keys;
use signal_core::{AgentContext, Direction, Signal};
use std::fmt;

/// Largest score any bucket can normally reach
pub const MAX_BUCKET_SCORE: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Bull,
    Bear,
    RiskOn,
    RiskOff,
    Transitional,
}

impl Regime {
    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Bull => "bull",
            Regime::Bear => "bear",
            Regime::RiskOn => "risk_on",
            Regime::RiskOff => "risk_off",
            Regime::Transitional => "transitional",
        }
    }

    /// Position of the regime on a bearish (0) to bullish (1) scale
    pub fn unit_score(self) -> f64 {
        match self {
            Regime::Bull => 1.0,
            Regime::RiskOn => 0.75,
            Regime::Transitional => 0.5,
            Regime::RiskOff => 0.25,
            Regime::Bear => 0.0,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Regime::Bull | Regime::RiskOn => Direction::Bullish,
            Regime::Bear | Regime::RiskOff => Direction::Bearish,
            Regime::Transitional => Direction::Neutral,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Macro indicator readings; `None` means unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeIndicators {
    pub volatility_index: Option<f64>,
    pub growth_rate: Option<f64>,
    pub policy_rate: Option<f64>,
    pub yield_spread: Option<f64>,
}

impl RegimeIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volatility_index(mut self, value: f64) -> Self {
        self.volatility_index = Some(value);
        self
    }

    pub fn with_growth_rate(mut self, value: f64) -> Self {
        self.growth_rate = Some(value);
        self
    }

    pub fn with_policy_rate(mut self, value: f64) -> Self {
        self.policy_rate = Some(value);
        self
    }

    pub fn with_yield_spread(mut self, value: f64) -> Self {
        self.yield_spread = Some(value);
        self
    }

    /// Read the indicators from an agent context
    ///
    /// Any key that cannot be resolved to a number is treated as missing.
    pub async fn from_context(context: &AgentContext, subject_id: &str) -> Self {
        let (volatility_index, growth_rate, policy_rate, yield_spread) = tokio::join!(
            read_indicator(context, subject_id, keys::VOLATILITY_INDEX),
            read_indicator(context, subject_id, keys::GROWTH_RATE),
            read_indicator(context, subject_id, keys::POLICY_RATE),
            read_indicator(context, subject_id, keys::YIELD_SPREAD),
        );

        Self {
            volatility_index,
            growth_rate,
            policy_rate,
            yield_spread,
        }
    }

    pub fn available(&self) -> usize {
        [
            self.volatility_index,
            self.growth_rate,
            self.policy_rate,
            self.yield_spread,
        ]
        .iter()
        .filter(|value| value.is_some_and(f64::is_finite))
        .count()
    }
}

async fn read_indicator(context: &AgentContext, subject_id: &str, key: &str) -> Option<f64> {
    match context.fetch_f64(subject_id, key).await {
        Ok(value) if value.is_finite() => Some(value),
        Ok(value) => {
            tracing::debug!(key = %key, value, "Ignoring non-finite indicator");
            None
        }
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "Indicator unavailable");
            None
        }
    }
}

/// Cut-offs for each indicator vote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    /// Volatility below this is calm
    pub volatility_low: f64,
    /// Volatility above this is stressed
    pub volatility_high: f64,
    /// Growth above this is strong
    pub growth_strong: f64,
    /// Growth below this is contraction
    pub growth_contraction: f64,
    /// Policy rate below this is accommodative
    pub policy_accommodative: f64,
    /// Policy rate above this is restrictive
    pub policy_restrictive: f64,
    /// Yield spread below this is an inverted curve
    pub spread_inverted: f64,
    /// Yield spread above this is a steep curve
    pub spread_steep: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            volatility_low: 15.0,
            volatility_high: 30.0,
            growth_strong: 3.0,
            growth_contraction: 0.0,
            policy_accommodative: 2.0,
            policy_restrictive: 5.0,
            spread_inverted: 0.0,
            spread_steep: 1.0,
        }
    }
}

impl RegimeThresholds {
    pub fn validate(&self) -> Result<()> {
        let pairs = [
            ("volatility", self.volatility_low, self.volatility_high),
            ("growth", self.growth_contraction, self.growth_strong),
            ("policy", self.policy_accommodative, self.policy_restrictive),
            ("spread", self.spread_inverted, self.spread_steep),
        ];
        for (name, low, high) in pairs {
            if !low.is_finite() || !high.is_finite() {
                return Err(ConsensusError::ConfigError(format!(
                    "{name} thresholds must be finite"
                )));
            }
            if low > high {
                return Err(ConsensusError::ConfigError(format!(
                    "{name} lower threshold {low} exceeds upper threshold {high}"
                )));
            }
        }
        Ok(())
    }
}

/// Vote totals per bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeScores {
    pub bull: u32,
    pub bear: u32,
    pub risk_on: u32,
    pub risk_off: u32,
}

impl RegimeScores {
    fn add(&mut self, other: RegimeScores) {
        self.bull += other.bull;
        self.bear += other.bear;
        self.risk_on += other.risk_on;
        self.risk_off += other.risk_off;
    }

    /// Highest bucket and its votes, or transitional when nothing voted
    ///
    /// Ties go to the earlier of bull, bear, risk-on, risk-off.
    pub(crate) fn leading(&self) -> (Regime, u32) {
        [
            (Regime::Bull, self.bull),
            (Regime::Bear, self.bear),
            (Regime::RiskOn, self.risk_on),
            (Regime::RiskOff, self.risk_off),
        ]
        .into_iter()
        .fold((Regime::Transitional, 0), |best, candidate| {
            if candidate.1 > best.1 { candidate } else { best }
        })
    }
}

/// Votes cast by one indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorContribution {
    pub indicator: String,
    pub value: f64,
    pub votes: RegimeScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub confidence: f64,
    pub scores: RegimeScores,
    pub contributions: Vec<IndicatorContribution>,
}

impl RegimeState {
    /// Express the regime as a `market_regime` ensemble stage
    pub fn to_stage_score(&self) -> StageScore {
        let signal = Signal::derived(
            self.regime.direction(),
            self.confidence,
            format!("{} regime ({:.0}% of max votes)", self.regime, self.confidence * 100.0),
            "regime-detector",
        );
        StageScore::unit(
            stages::MARKET_REGIME,
            self.regime.unit_score(),
            signal,
            self.confidence,
        )
    }
}

/// Classifies indicator readings into a [`Regime`]
#[derive(Debug, Clone, Default)]
pub struct RegimeDetector {
    thresholds: RegimeThresholds,
}

impl RegimeDetector {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    pub fn detect(&self, indicators: &RegimeIndicators) -> RegimeState {
        let t = &self.thresholds;
        let mut contributions = Vec::new();

        if let Some(vix) = finite(indicators.volatility_index) {
            let votes = if vix < t.volatility_low {
                RegimeScores { bull: 2, risk_on: 2, ..Default::default() }
            } else if vix > t.volatility_high {
                RegimeScores { bear: 2, risk_off: 2, ..Default::default() }
            } else {
                RegimeScores::default()
            };
            contributions.push(contribution(keys::VOLATILITY_INDEX, vix, votes));
        }

        if let Some(growth) = finite(indicators.growth_rate) {
            let votes = if growth > t.growth_strong {
                RegimeScores { bull: 2, risk_on: 1, ..Default::default() }
            } else if growth < t.growth_contraction {
                RegimeScores { bear: 2, risk_off: 2, ..Default::default() }
            } else {
                RegimeScores::default()
            };
            contributions.push(contribution(keys::GROWTH_RATE, growth, votes));
        }

        if let Some(rate) = finite(indicators.policy_rate) {
            let votes = if rate < t.policy_accommodative {
                RegimeScores { bull: 1, risk_on: 1, ..Default::default() }
            } else if rate > t.policy_restrictive {
                RegimeScores { bear: 1, risk_off: 1, ..Default::default() }
            } else {
                RegimeScores::default()
            };
            contributions.push(contribution(keys::POLICY_RATE, rate, votes));
        }

        if let Some(spread) = finite(indicators.yield_spread) {
            let votes = if spread < t.spread_inverted {
                RegimeScores { bear: 1, risk_off: 1, ..Default::default() }
            } else if spread > t.spread_steep {
                RegimeScores { bull: 1, risk_on: 1, ..Default::default() }
            } else {
                RegimeScores::default()
            };
            contributions.push(contribution(keys::YIELD_SPREAD, spread, votes));
        }

        let mut scores = RegimeScores::default();
        for item in &contributions {
            scores.add(item.votes);
        }

        let (regime, top) = scores.leading();

        let confidence = if top == 0 {
            0.0
        } else {
            clamp_unit(f64::from(top) / MAX_BUCKET_SCORE)
        };

        tracing::debug!(
            regime = %regime,
            confidence,
            bull = scores.bull,
            bear = scores.bear,
            risk_on = scores.risk_on,
            risk_off = scores.risk_off,
            "Regime detected"
        );

        RegimeState {
            regime,
            confidence,
            scores,
            contributions,
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn contribution(indicator: &str, value: f64, votes: RegimeScores) -> IndicatorContribution {
    IndicatorContribution {
        indicator: indicator.to_string(),
        value,
        votes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use signal_core::DataSource;
    use std::sync::Arc;

    mock! {
        pub Source {}

        #[async_trait]
        impl DataSource for Source {
            async fn fetch(&self, subject_id: &str, key: &str) -> signal_core::Result<serde_json::Value>;
        }
    }

    fn detect(indicators: RegimeIndicators) -> RegimeState {
        RegimeDetector::default().detect(&indicators)
    }

    #[test]
    fn test_calm_growth_is_bull() {
        let state = detect(
            RegimeIndicators::new()
                .with_volatility_index(12.0)
                .with_growth_rate(3.5),
        );
        assert_eq!(state.regime, Regime::Bull);
        assert_eq!(state.scores.bull, 4);
        assert_eq!(state.scores.risk_on, 3);
        assert!((state.confidence - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(state.contributions.len(), 2);
    }

    #[test]
    fn test_stress_is_bear() {
        let state = detect(
            RegimeIndicators::new()
                .with_volatility_index(35.0)
                .with_growth_rate(-1.0)
                .with_policy_rate(5.5),
        );
        assert_eq!(state.regime, Regime::Bear);
        assert_eq!(state.scores.bear, 5);
        assert_eq!(state.scores.risk_off, 5);
        assert!((state.confidence - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_indicators_is_transitional() {
        let state = detect(RegimeIndicators::new());
        assert_eq!(state.regime, Regime::Transitional);
        assert_eq!(state.confidence, 0.0);
        assert!(state.contributions.is_empty());
    }

    #[test]
    fn test_mid_range_readings_are_transitional() {
        let state = detect(
            RegimeIndicators::new()
                .with_volatility_index(20.0)
                .with_growth_rate(1.5)
                .with_policy_rate(3.0),
        );
        assert_eq!(state.regime, Regime::Transitional);
        assert_eq!(state.confidence, 0.0);
        assert_eq!(state.contributions.len(), 3);
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        let state = detect(
            RegimeIndicators::new()
                .with_volatility_index(15.0)
                .with_growth_rate(3.0)
                .with_policy_rate(2.0),
        );
        assert_eq!(state.scores, RegimeScores::default());
    }

    #[test]
    fn test_tie_prefers_bull_over_bear() {
        // calm volatility (+2 bull) against contraction (+2 bear)
        let state = detect(
            RegimeIndicators::new()
                .with_volatility_index(12.0)
                .with_growth_rate(-0.5),
        );
        assert_eq!(state.scores.bull, 2);
        assert_eq!(state.scores.bear, 2);
        assert_eq!(state.scores.risk_off, 2);
        assert_eq!(state.regime, Regime::Bull);
    }

    #[test]
    fn test_leading_bucket_priority() {
        let scores = |bull, bear, risk_on, risk_off| RegimeScores { bull, bear, risk_on, risk_off };

        assert_eq!(scores(1, 1, 3, 3).leading(), (Regime::RiskOn, 3));
        assert_eq!(scores(1, 1, 2, 3).leading(), (Regime::RiskOff, 3));
        assert_eq!(scores(2, 2, 2, 2).leading(), (Regime::Bull, 2));
        assert_eq!(scores(1, 2, 2, 2).leading(), (Regime::Bear, 2));
        assert_eq!(scores(0, 0, 0, 0).leading(), (Regime::Transitional, 0));
    }

    #[test]
    fn test_bear_wins_tie_with_risk_off() {
        let state = detect(
            RegimeIndicators::new()
                .with_growth_rate(-0.5)
                .with_yield_spread(-0.3)
                .with_policy_rate(1.0),
        );
        // bear 3, risk_off 3, bull 1, risk_on 1: bear wins the tie
        assert_eq!(state.regime, Regime::Bear);
        assert!((state.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_nan_indicator_is_ignored() {
        let state = detect(RegimeIndicators::new().with_volatility_index(f64::NAN));
        assert!(state.contributions.is_empty());
        assert_eq!(state.regime, Regime::Transitional);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = RegimeThresholds {
            volatility_low: 20.0,
            ..Default::default()
        };
        let state = RegimeDetector::new(thresholds)
            .detect(&RegimeIndicators::new().with_volatility_index(18.0));
        assert_eq!(state.regime, Regime::Bull);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(RegimeThresholds::default().validate().is_ok());
        let inverted = RegimeThresholds {
            volatility_low: 40.0,
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(ConsensusError::ConfigError(_))));
    }

    #[test]
    fn test_stage_score_mapping() {
        let state = detect(
            RegimeIndicators::new()
                .with_volatility_index(12.0)
                .with_growth_rate(3.5),
        );
        let stage = state.to_stage_score();
        assert_eq!(stage.stage, stages::MARKET_REGIME);
        assert_eq!(stage.score, 1.0);
        assert_eq!(stage.signal.direction(), Direction::Bullish);
        assert_eq!(Regime::RiskOff.unit_score(), 0.25);
        assert_eq!(Regime::Transitional.direction(), Direction::Neutral);
    }

    #[tokio::test]
    async fn test_indicators_from_context() {
        let mut source = MockSource::new();
        source.expect_fetch().returning(|_, key| match key {
            "gdp_growth" => Ok(json!(3.4)),
            "fed_funds_rate" => Ok(json!("unknown")),
            _ => Err(signal_core::Error::DataUnavailable {
                subject: "US".to_string(),
                key: key.to_string(),
            }),
        });

        let context = AgentContext::new()
            .with_value(keys::VOLATILITY_INDEX, json!(13.1))
            .with_data_source(Arc::new(source));

        let indicators = RegimeIndicators::from_context(&context, "US").await;
        assert_eq!(indicators.volatility_index, Some(13.1));
        assert_eq!(indicators.growth_rate, Some(3.4));
        assert_eq!(indicators.policy_rate, None);
        assert_eq!(indicators.yield_spread, None);
        assert_eq!(indicators.available(), 2);
    }
}
