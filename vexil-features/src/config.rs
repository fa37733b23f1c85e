//! Feature flag system configuration
//!
//! Values come from defaults, a preset, a TOML document, or `VEXIL_*`
//! environment variables layered over the defaults.

use crate::analytics::DEFAULT_MAX_EVENTS;
use crate::error::{FeatureError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Configuration for [`FlagSystem`](crate::FlagSystem)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Share of users sent to variant A by `create_default`
    pub default_split: f64,
    /// Record every facade evaluation in the tracker
    pub track_evaluations: bool,
    /// Evaluation events kept before the oldest is dropped
    pub max_tracked_events: usize,
    /// Forward kill switch records to the audit sink
    pub audit_enabled: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            default_split: 0.5,
            track_evaluations: true,
            max_tracked_events: DEFAULT_MAX_EVENTS,
            audit_enabled: true,
        }
    }
}

impl FeaturesConfig {
    /// Create a new configuration builder
    pub fn builder() -> FeaturesConfigBuilder {
        FeaturesConfigBuilder::default()
    }

    /// Configuration for development (large tracking window)
    pub fn development() -> Self {
        Self {
            default_split: 0.5,
            track_evaluations: true,
            max_tracked_events: 100_000,
            audit_enabled: true,
        }
    }

    /// Configuration for production (no per-evaluation tracking)
    pub fn production() -> Self {
        Self {
            default_split: 0.5,
            track_evaluations: false,
            max_tracked_events: DEFAULT_MAX_EVENTS,
            audit_enabled: true,
        }
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_features::FeaturesConfig;
    ///
    /// let config = FeaturesConfig::from_toml_str("default_split = 0.2").unwrap();
    /// assert_eq!(config.default_split, 0.2);
    /// assert!(config.track_evaluations);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Defaults overridden by `VEXIL_DEFAULT_SPLIT`,
    /// `VEXIL_TRACK_EVALUATIONS`, `VEXIL_MAX_TRACKED_EVENTS` and
    /// `VEXIL_AUDIT_ENABLED`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("VEXIL_DEFAULT_SPLIT") {
            config.default_split = value
                .trim()
                .parse()
                .map_err(|_| FeatureError::invalid("default_split", value, "not a number"))?;
        }
        if let Some(value) = lookup("VEXIL_TRACK_EVALUATIONS") {
            config.track_evaluations = parse_bool("track_evaluations", &value)?;
        }
        if let Some(value) = lookup("VEXIL_MAX_TRACKED_EVENTS") {
            config.max_tracked_events = value
                .trim()
                .parse()
                .map_err(|_| FeatureError::invalid("max_tracked_events", value, "not an integer"))?;
        }
        if let Some(value) = lookup("VEXIL_AUDIT_ENABLED") {
            config.audit_enabled = parse_bool("audit_enabled", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject an out-of-range split or a zero tracker capacity
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_split) {
            return Err(FeatureError::invalid(
                "default_split",
                self.default_split,
                "must be within [0, 1]",
            ));
        }
        if self.max_tracked_events == 0 {
            return Err(FeatureError::invalid(
                "max_tracked_events",
                self.max_tracked_events,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FeatureError::invalid(name, value, "not a boolean")),
    }
}

/// Builder for FeaturesConfig
#[derive(Default)]
pub struct FeaturesConfigBuilder {
    config: FeaturesConfig,
}

impl FeaturesConfigBuilder {
    pub fn default_split(mut self, split: f64) -> Self {
        self.config.default_split = split;
        self
    }

    pub fn track_evaluations(mut self, enabled: bool) -> Self {
        self.config.track_evaluations = enabled;
        self
    }

    pub fn max_tracked_events(mut self, max: usize) -> Self {
        self.config.max_tracked_events = max;
        self
    }

    pub fn audit_enabled(mut self, enabled: bool) -> Self {
        self.config.audit_enabled = enabled;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<FeaturesConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
