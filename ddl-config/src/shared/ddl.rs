use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Timing configuration for the DDL barrier.
///
/// The elimination loop inspects the pending DDL entries once per check interval. Destructive
/// DDL waits for every known source, except sources that showed no activity for longer than the
/// unresponsiveness threshold.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DdlConfig {
    /// Interval in milliseconds between two elimination runs.
    ///
    /// Default: 1000 (1 second)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Inactivity in milliseconds after which a source no longer holds back a destructive DDL.
    ///
    /// Default: 60000 (60 seconds)
    #[serde(default = "default_unresponsive_threshold_ms")]
    pub unresponsive_threshold_ms: u64,
}

impl DdlConfig {
    /// Default elimination interval: 1 second.
    pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;

    /// Default unresponsiveness threshold: 60 seconds.
    pub const DEFAULT_UNRESPONSIVE_THRESHOLD_MS: u64 = 60_000;

    /// Returns the elimination interval as a [`Duration`].
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Returns the unresponsiveness threshold as a [`Duration`].
    pub fn unresponsive_threshold(&self) -> Duration {
        Duration::from_millis(self.unresponsive_threshold_ms)
    }

    /// Validates the DDL configuration.
    ///
    /// Ensures the interval is non-zero and the threshold spans more than one interval.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.check_interval_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "check_interval_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.unresponsive_threshold_ms <= self.check_interval_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "unresponsive_threshold_ms".to_string(),
                constraint: "must be greater than check_interval_ms".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for DdlConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: Self::DEFAULT_CHECK_INTERVAL_MS,
            unresponsive_threshold_ms: Self::DEFAULT_UNRESPONSIVE_THRESHOLD_MS,
        }
    }
}

fn default_check_interval_ms() -> u64 {
    DdlConfig::DEFAULT_CHECK_INTERVAL_MS
}

fn default_unresponsive_threshold_ms() -> u64 {
    DdlConfig::DEFAULT_UNRESPONSIVE_THRESHOLD_MS
}
