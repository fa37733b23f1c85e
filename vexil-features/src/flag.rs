//! Feature Flag Core
//!
//! Defines flags, rollout strategies and the counters evaluation updates.

use crate::error::{FeatureError, Result};
use crate::user::AttributeValue;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Probability in `[0, 1]`
///
/// Out-of-range values are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Percentage(f64);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);
    pub const HALF: Percentage = Percentage(0.5);
    pub const FULL: Percentage = Percentage(1.0);

    /// Validate a fraction
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_features::Percentage;
    ///
    /// assert!(Percentage::new(0.25).is_ok());
    /// assert!(Percentage::new(1.2).is_err());
    /// assert!(Percentage::new(f64::NAN).is_err());
    /// ```
    pub fn new(value: f64) -> Result<Self> {
        Self::named("percentage", value)
    }

    /// Validate a fraction, naming the parameter in the error
    pub(crate) fn named(name: &'static str, value: f64) -> Result<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Percentage(value))
        } else {
            Err(FeatureError::invalid(name, value, "must be within [0, 1]"))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Percentage {
    type Error = FeatureError;

    fn try_from(value: f64) -> Result<Self> {
        Percentage::new(value)
    }
}

impl From<Percentage> for f64 {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

/// Who a targeted flag is on for
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetSet {
    #[serde(default)]
    pub users: HashSet<String>,

    #[serde(default)]
    pub groups: HashSet<String>,

    /// Attribute name to the value it must equal
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.users.insert(user_id.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && self.attributes.is_empty()
    }
}

/// Rollout strategy
///
/// Each case carries only what it needs. `Unknown` is what an unrecognised
/// `type` deserializes to; it always evaluates to off.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// On for every user
    #[default]
    AllUsers,

    /// On for users whose bucket is below `percentage`
    Percentage { percentage: Percentage },

    /// On for listed users, groups, or matching attributes
    Targeted(TargetSet),

    /// Ramps from 0% at creation by 10 points per hour
    Gradual,

    /// Percentage rollout that refuses to exceed 5%
    Canary { percentage: Percentage },

    #[serde(other)]
    Unknown,
}

impl RolloutStrategy {
    /// Percentage rollout; fails outside `[0, 1]`
    pub fn percentage(value: f64) -> Result<Self> {
        Ok(RolloutStrategy::Percentage {
            percentage: Percentage::named("rollout_percentage", value)?,
        })
    }

    /// Canary rollout; fails outside `[0, 1]`
    ///
    /// Values above 5% are accepted but evaluate to off.
    pub fn canary(value: f64) -> Result<Self> {
        Ok(RolloutStrategy::Canary {
            percentage: Percentage::named("rollout_percentage", value)?,
        })
    }

    pub fn targeted(targets: TargetSet) -> Self {
        RolloutStrategy::Targeted(targets)
    }

    /// Configured rollout fraction, `0.0` for strategies without one
    pub fn rollout_percentage(&self) -> f64 {
        match self {
            RolloutStrategy::Percentage { percentage } | RolloutStrategy::Canary { percentage } => {
                percentage.value()
            }
            _ => 0.0,
        }
    }

    /// Number of explicitly targeted users
    pub fn target_user_count(&self) -> usize {
        match self {
            RolloutStrategy::Targeted(targets) => targets.users.len(),
            _ => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RolloutStrategy::AllUsers => "all_users",
            RolloutStrategy::Percentage { .. } => "percentage",
            RolloutStrategy::Targeted(_) => "targeted",
            RolloutStrategy::Gradual => "gradual",
            RolloutStrategy::Canary { .. } => "canary",
            RolloutStrategy::Unknown => "unknown",
        }
    }
}

/// Mutable descriptive part of a flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    pub description: String,
    pub strategy: RolloutStrategy,
    pub updated_at: DateTime<Utc>,
}

/// Feature flag
///
/// Shared between threads behind an `Arc`. `enabled` and the counters are
/// atomics; the definition sits behind a read-write lock.
#[derive(Debug)]
pub struct FeatureFlag {
    key: String,
    created_at: DateTime<Utc>,
    enabled: AtomicBool,
    definition: RwLock<FlagDefinition>,
    evaluations: AtomicU64,
    enabled_count: AtomicU64,
}

impl FeatureFlag {
    /// Create a disabled flag that targets all users once enabled
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use vexil_features::{FeatureFlag, RolloutStrategy};
    ///
    /// let flag = FeatureFlag::new("new_ui", "New UI Design", "Redesigned interface", Utc::now())
    ///     .with_strategy(RolloutStrategy::percentage(0.25).unwrap())
    ///     .with_enabled(true);
    ///
    /// assert!(flag.is_enabled());
    /// assert_eq!(flag.rollout_percentage(), 0.25);
    /// ```
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            created_at,
            enabled: AtomicBool::new(false),
            definition: RwLock::new(FlagDefinition {
                name: name.into(),
                description: description.into(),
                strategy: RolloutStrategy::AllUsers,
                updated_at: created_at,
            }),
            evaluations: AtomicU64::new(0),
            enabled_count: AtomicU64::new(0),
        }
    }

    /// Set the rollout strategy
    pub fn with_strategy(self, strategy: RolloutStrategy) -> Self {
        self.definition.write().strategy = strategy;
        self
    }

    /// Set the global on/off state
    pub fn with_enabled(self, enabled: bool) -> Self {
        self.enabled.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.definition.read().updated_at
    }

    pub fn name(&self) -> String {
        self.definition.read().name.clone()
    }

    pub fn description(&self) -> String {
        self.definition.read().description.clone()
    }

    pub fn strategy(&self) -> RolloutStrategy {
        self.definition.read().strategy.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn rollout_percentage(&self) -> f64 {
        self.definition.read().strategy.rollout_percentage()
    }

    pub fn target_user_count(&self) -> usize {
        self.definition.read().strategy.target_user_count()
    }

    /// Total evaluations, including ones made while disabled
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::SeqCst)
    }

    /// Evaluations that returned true
    pub fn enabled_count(&self) -> u64 {
        self.enabled_count.load(Ordering::SeqCst)
    }

    /// Consistent view of the flag
    ///
    /// `enabled_count` is read before `evaluations`, and writers bump
    /// `evaluations` first, so the snapshot never shows more enabled
    /// results than evaluations.
    pub fn snapshot(&self) -> FlagSnapshot {
        let enabled_count = self.enabled_count();
        let evaluations = self.evaluations();
        let definition = self.definition.read().clone();

        FlagSnapshot {
            key: self.key.clone(),
            name: definition.name,
            description: definition.description,
            enabled: self.is_enabled(),
            strategy: definition.strategy,
            created_at: self.created_at,
            updated_at: definition.updated_at,
            evaluations,
            enabled_count,
        }
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn set_strategy(&self, strategy: RolloutStrategy, now: DateTime<Utc>) {
        let mut definition = self.definition.write();
        definition.strategy = strategy;
        definition.updated_at = now;
    }

    pub(crate) fn apply(&self, update: FlagUpdate, now: DateTime<Utc>) {
        let mut definition = self.definition.write();

        if let Some(name) = update.name {
            definition.name = name;
        }
        if let Some(description) = update.description {
            definition.description = description;
        }
        if let Some(strategy) = update.strategy {
            definition.strategy = strategy;
        }
        if let Some(enabled) = update.enabled {
            self.enabled.store(enabled, Ordering::SeqCst);
        }
        definition.updated_at = now;
    }

    pub(crate) fn with_definition<R>(&self, f: impl FnOnce(&FlagDefinition) -> R) -> R {
        f(&*self.definition.read())
    }

    pub(crate) fn record_evaluation(&self, enabled: bool) {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if enabled {
            self.enabled_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Point-in-time copy of a flag, suitable for serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    pub key: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub strategy: RolloutStrategy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub evaluations: u64,
    pub enabled_count: u64,
}

/// Partial update applied by the registry
///
/// Only fields that are set are changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub strategy: Option<RolloutStrategy>,
}

impl FlagUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn strategy(mut self, strategy: RolloutStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.enabled.is_none()
            && self.strategy.is_none()
    }
}
