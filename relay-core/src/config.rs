//! Configuration types

use crate::{ConfigError, RelayResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How request-for-assistance orders eligible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Lowest utilization first, ties broken by active count then agent id
    #[default]
    LeastLoaded,
    /// Ascending agent id
    LowestId,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::LeastLoaded => "least_loaded",
            SelectionStrategy::LowestId => "lowest_id",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "least_loaded" => Ok(SelectionStrategy::LeastLoaded),
            "lowest_id" => Ok(SelectionStrategy::LowestId),
            _ => Err(ConfigError::InvalidValue {
                field: "selection_strategy".to_string(),
                value: s.to_string(),
                reason: "expected least_loaded or lowest_id".to_string(),
            }),
        }
    }
}

/// Runtime settings for the assignment and handoff core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// How long a handoff may stay pending before it is rejected as expired
    pub handoff_ttl: Duration,
    /// Trailing window used for `recent_completions` in workload views
    pub recent_completion_window: Duration,
    pub selection_strategy: SelectionStrategy,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handoff_ttl: Duration::from_secs(1800),
            recent_completion_window: Duration::from_secs(7 * 24 * 3600),
            selection_strategy: SelectionStrategy::LeastLoaded,
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

impl RelayConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - durations are positive and representable as chrono durations
    /// - 0 < default_page_size <= max_page_size
    pub fn validate(&self) -> RelayResult<()> {
        check_duration("handoff_ttl", self.handoff_ttl)?;
        check_duration("recent_completion_window", self.recent_completion_window)?;

        if self.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                value: self.default_page_size.to_string(),
                reason: format!("must not exceed max_page_size ({})", self.max_page_size),
            }
            .into());
        }
        Ok(())
    }

    pub fn handoff_ttl_chrono(&self) -> RelayResult<chrono::Duration> {
        to_chrono("handoff_ttl", self.handoff_ttl)
    }

    pub fn recent_window_chrono(&self) -> RelayResult<chrono::Duration> {
        to_chrono("recent_completion_window", self.recent_completion_window)
    }

    /// Resolve a requested page size against the configured default and cap.
    ///
    /// Always at least 1, even for a config that would fail `validate()`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
            .max(1)
    }
}

fn check_duration(field: &str, value: Duration) -> RelayResult<()> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: "must be positive".to_string(),
        }
        .into());
    }
    to_chrono(field, value).map(|_| ())
}

fn to_chrono(field: &str, value: Duration) -> RelayResult<chrono::Duration> {
    chrono::Duration::from_std(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: e.to_string(),
        }
        .into()
    })
}
