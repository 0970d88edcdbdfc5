//! Directional signals produced by agents and ensemble stages
//!
//! A [`Signal`] is immutable once built: every field is validated by the
//! constructor and there are no setters. Agents return a [`Verdict`], which
//! the executor validates into a `Signal` tagged with the producing agent.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a judgment about a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    /// All directions, in the order used for distributions and reports
    pub const ALL: [Direction; 3] = [Direction::Bullish, Direction::Bearish, Direction::Neutral];

    /// Sign used by score-based reductions: bullish +1, bearish -1, neutral 0
    pub fn multiplier(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    /// Position on the [0, 1] directional scale: bullish 1, neutral 0.5, bearish 0
    pub fn unit_value(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => 0.0,
            Direction::Neutral => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Direction::Bullish),
            "bearish" => Ok(Direction::Bearish),
            "neutral" => Ok(Direction::Neutral),
            other => Err(Error::InvalidOutput(format!("unknown direction '{other}'"))),
        }
    }
}

/// Raw judgment returned by an agent before validation
///
/// Nothing about a verdict is trusted: the executor checks the confidence
/// range and reasoning before it becomes a [`Signal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub direction: Direction,
    pub confidence: f64,
    pub reasoning: String,
}

impl Verdict {
    pub fn new(direction: Direction, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            direction,
            confidence,
            reasoning: reasoning.into(),
        }
    }

    pub fn bullish(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Bullish, confidence, reasoning)
    }

    pub fn bearish(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Bearish, confidence, reasoning)
    }

    pub fn neutral(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Neutral, confidence, reasoning)
    }
}

/// Validated, immutable directional judgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SignalRecord")]
pub struct Signal {
    direction: Direction,
    confidence: f64,
    reasoning: String,
    produced_by: String,
    created_at: DateTime<Utc>,
}

/// Unvalidated wire form, used only to route deserialization through [`Signal::new`]
#[derive(Deserialize)]
struct SignalRecord {
    direction: Direction,
    confidence: f64,
    reasoning: String,
    produced_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SignalRecord> for Signal {
    type Error = Error;

    fn try_from(record: SignalRecord) -> Result<Self> {
        let mut signal = Signal::new(
            record.direction,
            record.confidence,
            record.reasoning,
            record.produced_by,
        )?;
        signal.created_at = record.created_at;
        Ok(signal)
    }
}

impl Signal {
    /// Build a signal, rejecting confidence outside [0, 1] and empty reasoning
    pub fn new(
        direction: Direction,
        confidence: f64,
        reasoning: impl Into<String>,
        produced_by: impl Into<String>,
    ) -> Result<Self> {
        let reasoning = reasoning.into();
        let produced_by = produced_by.into();

        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidSignal(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        if reasoning.trim().is_empty() {
            return Err(Error::InvalidSignal("reasoning must not be empty".to_string()));
        }
        if produced_by.trim().is_empty() {
            return Err(Error::InvalidSignal("producer must not be empty".to_string()));
        }

        Ok(Self {
            direction,
            confidence,
            reasoning,
            produced_by,
            created_at: Utc::now(),
        })
    }

    /// Validate an agent's verdict into a signal attributed to `produced_by`
    pub fn from_verdict(verdict: Verdict, produced_by: impl Into<String>) -> Result<Self> {
        Self::new(
            verdict.direction,
            verdict.confidence,
            verdict.reasoning,
            produced_by,
        )
    }

    /// Build a signal from values computed by the engine itself
    ///
    /// Confidence is clamped into [0, 1] (NaN becomes 0.5) instead of being
    /// rejected, so arithmetic results can never fail construction.
    pub fn derived(
        direction: Direction,
        confidence: f64,
        reasoning: impl Into<String>,
        produced_by: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.5
        } else {
            confidence.clamp(0.0, 1.0)
        };
        let reasoning = non_empty(reasoning.into(), "no reasoning given");
        let produced_by = non_empty(produced_by.into(), "engine");

        Self {
            direction,
            confidence,
            reasoning,
            produced_by,
            created_at: Utc::now(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn produced_by(&self) -> &str {
        &self.produced_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
