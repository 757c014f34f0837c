//! Shared vocabulary types used across filling, bootstrapping and analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Artificial Gap Scenarios
// ============================================================================

/// Masking pattern used to simulate artificial gaps at measured points.
///
/// Filling every point of a series under `HalfHour` also fills the real gaps,
/// which is why the half-hour scenario doubles as the production fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    /// Each half-hour is masked individually.
    HalfHour,
    /// Every half-hour of the anchor's calendar day is masked.
    Day,
}

impl Scenario {
    /// Fixed iteration order of the artificial gap simulator.
    pub const ALL: [Scenario; 2] = [Scenario::HalfHour, Scenario::Day];

    /// Suffix used in channel names (`<Technique>_<suffix>`).
    pub fn suffix(self) -> &'static str {
        match self {
            Scenario::HalfHour => "hhs",
            Scenario::Day => "days",
        }
    }

    /// Build the channel name holding a technique's predictions for this scenario.
    pub fn channel_name(self, technique: &str) -> String {
        format!("{}_{}", technique, self.suffix())
    }

    /// Strip this scenario's suffix from a channel name, if present.
    pub fn technique_of(self, channel: &str) -> Option<&str> {
        channel
            .strip_suffix(self.suffix())
            .and_then(|rest| rest.strip_suffix('_'))
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

// ============================================================================
// Time-of-Day Filters
// ============================================================================

/// Subset of observations used when bootstrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    /// All observations.
    FullTime,
    /// Observations where the light covariate exceeds the threshold.
    DayTime,
    /// Observations where the light covariate is at or below the threshold.
    NightTime,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 3] = [TimeOfDay::FullTime, TimeOfDay::DayTime, TimeOfDay::NightTime];

    /// Short code used in file names and tables.
    pub fn code(self) -> &'static str {
        match self {
            TimeOfDay::FullTime => "ft",
            TimeOfDay::DayTime => "dt",
            TimeOfDay::NightTime => "nt",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::FullTime => write!(f, "full-time"),
            TimeOfDay::DayTime => write!(f, "day-time"),
            TimeOfDay::NightTime => write!(f, "night-time"),
        }
    }
}

// ============================================================================
// Bootstrap Statistics
// ============================================================================

/// Performance statistic computed per technique and bootstrap repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    /// Mean of predicted minus observed.
    Bias,
    /// Laplace scale estimate: sqrt(2) times the mean absolute deviation.
    SDev,
    /// Squared Pearson correlation between predicted and observed.
    R2,
}

impl Statistic {
    pub const ALL: [Statistic; 3] = [Statistic::Bias, Statistic::SDev, Statistic::R2];

    pub fn index(self) -> usize {
        match self {
            Statistic::Bias => 0,
            Statistic::SDev => 1,
            Statistic::R2 => 2,
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Bias" => Some(Statistic::Bias),
            "SDev" => Some(Statistic::SDev),
            "R2" => Some(Statistic::R2),
            _ => None,
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Bias => write!(f, "Bias"),
            Statistic::SDev => write!(f, "SDev"),
            Statistic::R2 => write!(f, "R2"),
        }
    }
}
