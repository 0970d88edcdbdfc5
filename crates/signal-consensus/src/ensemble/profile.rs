use super::stages;
use crate::regime::Regime;
use crate::{ConsensusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stage weights for one exact set of stages
///
/// A profile only applies when the reporting stages match its keys exactly;
/// there is no implicit renormalisation over a subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightProfileRecord")]
pub struct WeightProfile {
    name: String,
    weights: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regime: Option<Regime>,
}

impl WeightProfile {
    /// Create a profile, rejecting empty, negative or all-zero weights
    pub fn new<I, S>(name: impl Into<String>, weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let name = name.into();
        let mut map = BTreeMap::new();
        for (stage, weight) in weights {
            let stage = stage.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConsensusError::InvalidProfile {
                    name,
                    reason: format!("stage {stage} has invalid weight {weight}"),
                });
            }
            if map.insert(stage.clone(), weight).is_some() {
                return Err(ConsensusError::InvalidProfile {
                    name,
                    reason: format!("stage {stage} listed twice"),
                });
            }
        }

        if map.is_empty() {
            return Err(ConsensusError::InvalidProfile {
                name,
                reason: "no stages".to_string(),
            });
        }
        if map.values().sum::<f64>() <= 0.0 {
            return Err(ConsensusError::InvalidProfile {
                name,
                reason: "weights sum to zero".to_string(),
            });
        }

        Ok(Self {
            name,
            weights: map,
            regime: None,
        })
    }

    /// Restrict the profile to one market regime
    pub fn for_regime(mut self, regime: Regime) -> Self {
        self.regime = Some(regime);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regime(&self) -> Option<Regime> {
        self.regime
    }

    pub fn weight(&self, stage: &str) -> Option<f64> {
        self.weights.get(stage).copied()
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    pub(crate) fn matches(&self, available: &BTreeSet<&str>) -> bool {
        self.weights.len() == available.len()
            && self.weights.keys().all(|stage| available.contains(stage.as_str()))
    }

    fn same_stages(&self, other: &WeightProfile) -> bool {
        self.weights.len() == other.weights.len()
            && self.weights.keys().all(|stage| other.weights.contains_key(stage))
    }
}

#[derive(Deserialize)]
struct WeightProfileRecord {
    name: String,
    weights: BTreeMap<String, f64>,
    #[serde(default)]
    regime: Option<Regime>,
}

impl TryFrom<WeightProfileRecord> for WeightProfile {
    type Error = ConsensusError;

    fn try_from(record: WeightProfileRecord) -> Result<Self> {
        let profile = WeightProfile::new(record.name, record.weights)?;
        Ok(match record.regime {
            Some(regime) => profile.for_regime(regime),
            None => profile,
        })
    }
}

/// Every weight profile one kind of analysis may use
///
/// The first profile is primary; the others are fallbacks for partial stage
/// sets or overrides for particular regimes. Stage sets with no profile are
/// a configuration error, never silently reweighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileTableRecord")]
pub struct ProfileTable {
    name: String,
    primary: WeightProfile,
    #[serde(default)]
    alternatives: Vec<WeightProfile>,
    #[serde(default)]
    confidence_stages: Vec<String>,
}

impl ProfileTable {
    pub fn new(name: impl Into<String>, primary: WeightProfile) -> Self {
        Self {
            name: name.into(),
            primary,
            alternatives: Vec::new(),
            confidence_stages: Vec::new(),
        }
    }

    /// Add a fallback or regime-specific profile
    ///
    /// Fails if a profile with the same stage set and regime already exists.
    pub fn with_profile(mut self, profile: WeightProfile) -> Result<Self> {
        let clash = self
            .profiles()
            .any(|existing| existing.regime == profile.regime && existing.same_stages(&profile));
        if clash {
            return Err(ConsensusError::InvalidProfile {
                name: profile.name,
                reason: format!("duplicates a stage set already configured in {}", self.name),
            });
        }
        self.alternatives.push(profile);
        Ok(self)
    }

    /// Stages whose confidence forms the base confidence, when present
    pub fn with_confidence_stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.confidence_stages = stages.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary(&self) -> &WeightProfile {
        &self.primary
    }

    /// Primary profile first, then the alternatives in insertion order
    pub fn profiles(&self) -> impl Iterator<Item = &WeightProfile> {
        std::iter::once(&self.primary).chain(&self.alternatives)
    }

    pub fn confidence_stages(&self) -> &[String] {
        &self.confidence_stages
    }

    /// Stages of the primary profile
    pub fn expected_stages(&self) -> Vec<String> {
        self.primary.weights.keys().cloned().collect()
    }

    /// Pick the profile for exactly `available` stages
    ///
    /// A profile tagged with `regime` wins over an untagged one for the same
    /// stage set.
    pub fn select(&self, available: &BTreeSet<&str>, regime: Option<Regime>) -> Result<&WeightProfile> {
        let matching = |want: Option<Regime>| {
            self.profiles()
                .find(|profile| profile.regime == want && profile.matches(available))
        };

        regime
            .and_then(|r| matching(Some(r)))
            .or_else(|| matching(None))
            .ok_or_else(|| {
                ConsensusError::UnconfiguredStageSet(
                    available.iter().map(ToString::to_string).collect(),
                )
            })
    }

    /// Quantitative, qualitative and synthesis stages of a single-name analysis
    ///
    /// Without the synthesis stage the remaining two are reweighted 0.60 and
    /// 0.40. Base confidence comes from the synthesis and qualitative stages.
    pub fn analysis() -> Self {
        let primary = preset(
            "analysis",
            &[
                (stages::QUANTITATIVE, 0.40),
                (stages::QUALITATIVE, 0.30),
                (stages::SYNTHESIS, 0.30),
            ],
        );
        let degraded = preset(
            "analysis_without_synthesis",
            &[(stages::QUANTITATIVE, 0.60), (stages::QUALITATIVE, 0.40)],
        );

        let mut table = Self::new("analysis", primary)
            .with_confidence_stages([stages::SYNTHESIS, stages::QUALITATIVE]);
        table.alternatives.push(degraded);
        table
    }

    /// Five-stage technical analysis
    pub fn technical() -> Self {
        Self::new(
            "technical",
            preset(
                "technical",
                &[
                    (stages::TREND, 0.35),
                    (stages::MOMENTUM, 0.25),
                    (stages::VOLUME, 0.20),
                    (stages::VOLATILITY, 0.10),
                    (stages::AI_PATTERN, 0.10),
                ],
            ),
        )
    }

    /// Four-stage macro outlook
    pub fn macro_outlook() -> Self {
        Self::new(
            "macro",
            preset(
                "macro",
                &[
                    (stages::ECONOMIC_INDICATORS, 0.35),
                    (stages::MARKET_REGIME, 0.20),
                    (stages::SECTOR_IMPACT, 0.25),
                    (stages::AI_SYNTHESIS, 0.20),
                ],
            ),
        )
    }

    /// Look up a preset table by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "analysis" => Some(Self::analysis()),
            "technical" => Some(Self::technical()),
            "macro" => Some(Self::macro_outlook()),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ProfileTableRecord {
    name: String,
    primary: WeightProfile,
    #[serde(default)]
    alternatives: Vec<WeightProfile>,
    #[serde(default)]
    confidence_stages: Vec<String>,
}

impl TryFrom<ProfileTableRecord> for ProfileTable {
    type Error = ConsensusError;

    fn try_from(record: ProfileTableRecord) -> Result<Self> {
        let table = record
            .alternatives
            .into_iter()
            .try_fold(ProfileTable::new(record.name, record.primary), ProfileTable::with_profile)?;
        Ok(table.with_confidence_stages(record.confidence_stages))
    }
}

fn preset(name: &str, weights: &[(&str, f64)]) -> WeightProfile {
    WeightProfile {
        name: name.to_string(),
        weights: weights
            .iter()
            .map(|(stage, weight)| ((*stage).to_string(), *weight))
            .collect(),
        regime: None,
    }
}
