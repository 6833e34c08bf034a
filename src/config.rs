//! Runtime configuration for the asset layer.
//!
//! ```
//! use archetype_lifecycle::config::AssetConfig;
//!
//! let config = AssetConfig::from_json(r#"{ "common_label": "Shared", "diagnostics": true }"#).unwrap();
//! assert_eq!(config.common_label, "Shared");
//! assert_eq!(config.report_detail_limit, 20);
//! ```

use crate::error::{AssetError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted periodic report interval
pub const MAX_REPORT_INTERVAL_SECS: f32 = 86_400.0;

/// Asset layer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Label loaded once by the resident manager and kept for the whole process
    pub common_label: String,
    /// Register facade loads with the leak tracker and load registry
    pub diagnostics: bool,
    /// Panic when `get` misses a name instead of returning `None`
    pub assert_on_missing: bool,
    /// Seconds between periodic leak reports (clamped to at least 1)
    pub report_interval_secs: f32,
    /// Entries listed in a periodic report
    pub periodic_detail_limit: usize,
    /// Entries listed in an on-demand report
    pub report_detail_limit: usize,
    /// Upper bound for the combined debug report
    pub max_report_chars: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            common_label: "Common".to_string(),
            diagnostics: cfg!(debug_assertions),
            assert_on_missing: cfg!(debug_assertions),
            report_interval_secs: 10.0,
            periodic_detail_limit: 5,
            report_detail_limit: 20,
            max_report_chars: 16 * 1024,
        }
    }
}

impl AssetConfig {
    /// Parse and validate a JSON config
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AssetConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Diagnostic build preset
    pub fn diagnostic() -> Self {
        Self {
            diagnostics: true,
            assert_on_missing: true,
            ..Self::default()
        }
    }

    /// Release build preset
    pub fn release() -> Self {
        Self {
            diagnostics: false,
            assert_on_missing: false,
            ..Self::default()
        }
    }

    /// Reject values the rest of the crate cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.common_label.trim().is_empty() {
            return Err(AssetError::Config("common_label must not be empty".into()));
        }
        if !self.report_interval_secs.is_finite()
            || self.report_interval_secs <= 0.0
            || self.report_interval_secs > MAX_REPORT_INTERVAL_SECS
        {
            return Err(AssetError::Config(format!(
                "report_interval_secs must be in (0, {MAX_REPORT_INTERVAL_SECS}], got {}",
                self.report_interval_secs
            )));
        }
        if self.max_report_chars == 0 {
            return Err(AssetError::Config("max_report_chars must be non-zero".into()));
        }
        Ok(())
    }

    /// Periodic report interval, clamped to one second .. one day
    pub fn report_interval(&self) -> Duration {
        let secs = self
            .report_interval_secs
            .clamp(1.0, MAX_REPORT_INTERVAL_SECS);
        Duration::try_from_secs_f32(secs).unwrap_or(Duration::from_secs(1))
    }
}
