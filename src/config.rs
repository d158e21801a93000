//! Engine Configuration

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, Severity};

/// Whether records that shift into the middle of a paginated window,
/// without being touched by the batch, are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddleShiftPolicy {
    /// Only when the call reconciles a single page
    #[default]
    SinglePage,
    /// Always
    Always,
    /// Never; only boundary positions are reported
    Never,
}

impl MiddleShiftPolicy {
    /// Returns true if middle shifts are reported for a call over
    /// `page_count` pages
    pub fn surfaces(&self, page_count: usize) -> bool {
        match self {
            MiddleShiftPolicy::SinglePage => page_count == 1,
            MiddleShiftPolicy::Always => true,
            MiddleShiftPolicy::Never => false,
        }
    }
}

/// Change detection engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix of staging area names (default: "__staging")
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,

    /// Middle-shift reporting (default: single_page)
    #[serde(default)]
    pub middle_shift_policy: MiddleShiftPolicy,

    /// Look past a shrunken window for the record that slides in
    /// (default: true)
    #[serde(default = "default_shrink_lookahead")]
    pub shrink_lookahead: bool,

    /// Minimum log severity (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_staging_prefix() -> String {
    "__staging".to_string()
}

fn default_shrink_lookahead() -> bool {
    true
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staging_prefix: default_staging_prefix(),
            middle_shift_policy: MiddleShiftPolicy::default(),
            shrink_lookahead: default_shrink_lookahead(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration; absent keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_middle_shift_policy(mut self, policy: MiddleShiftPolicy) -> Self {
        self.middle_shift_policy = policy;
        self
    }

    /// Applies `log_level` to the process-wide logger.
    pub fn apply_logging(&self) {
        Logger::set_min_severity(self.log_level);
    }
}
