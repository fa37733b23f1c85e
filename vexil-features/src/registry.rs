//! Flag registry
//!
//! Owns every flag. Evaluation borrows an `Arc<FeatureFlag>` so counters
//! are updated on the single instance the registry holds.

use crate::clock::{Clock, SystemClock};
use crate::error::{FeatureError, Result};
use crate::flag::{FeatureFlag, FlagUpdate, Percentage, RolloutStrategy};
use crate::targeting::TargetingEngine;
use crate::user::User;
use dashmap::DashMap;
use std::sync::Arc;
use vexil_log::{info, warn};

/// Thread-safe registry of feature flags
pub struct FlagRegistry {
    flags: DashMap<String, Arc<FeatureFlag>>,
    engine: TargetingEngine,
    clock: Arc<dyn Clock>,
}

impl FlagRegistry {
    /// Create a registry using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a registry reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            flags: DashMap::new(),
            engine: TargetingEngine::new(),
            clock,
        }
    }

    /// Create a flag, disabled and targeting all users
    ///
    /// An existing flag with the same key is replaced, counters included.
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_features::{FlagRegistry, FlagUpdate, RolloutStrategy, User};
    ///
    /// let registry = FlagRegistry::new();
    /// registry.create("new_ui", "New UI Design", "Redesigned interface");
    /// registry
    ///     .update(
    ///         "new_ui",
    ///         FlagUpdate::new()
    ///             .enabled(true)
    ///             .strategy(RolloutStrategy::percentage(0.25).unwrap()),
    ///     )
    ///     .unwrap();
    ///
    /// // new_ui:2 hashes into bucket 0
    /// assert!(registry.is_enabled("new_ui", &User::new("2", "user2@test.com")));
    /// ```
    pub fn create(
        &self,
        key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Arc<FeatureFlag> {
        let key = key.into();
        let flag = Arc::new(FeatureFlag::new(
            key.clone(),
            name,
            description,
            self.clock.now(),
        ));

        if self.flags.insert(key.clone(), Arc::clone(&flag)).is_some() {
            warn!(fields: { "flag" => key }, "Replaced existing feature flag");
        }

        info!(fields: { "flag" => key }, "Created feature flag: {}", flag.name());

        flag
    }

    /// Apply a partial update
    ///
    /// Returns `Ok(false)` when no flag has this key. Percentages inside
    /// `update` were validated when its strategy was built.
    pub fn update(&self, key: &str, update: FlagUpdate) -> Result<bool> {
        let Some(flag) = self.lookup(key) else {
            warn!(fields: { "flag" => key }, "Update for unknown flag ignored");
            return Ok(false);
        };

        flag.apply(update, self.clock.now());
        info!(fields: { "flag" => key }, "Updated feature flag");

        Ok(true)
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<FeatureFlag>> {
        self.flags.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Like [`lookup`](Self::lookup), with a typed error for a missing key
    pub fn get(&self, key: &str) -> Result<Arc<FeatureFlag>> {
        self.lookup(key)
            .ok_or_else(|| FeatureError::flag_not_found(key))
    }

    /// Evaluate a flag for a user at the registry clock's `now`
    ///
    /// Unknown keys evaluate to `false`.
    pub fn is_enabled(&self, key: &str, user: &User) -> bool {
        match self.lookup(key) {
            Some(flag) => self.engine.evaluate(&flag, user, self.clock.now()),
            None => {
                warn!(fields: { "flag" => key }, "Flag not found, returning false");
                false
            }
        }
    }

    /// Switch a flag to a percentage rollout and step it towards `target`
    ///
    /// Each step raises the percentage by at most `step`. A flag already at
    /// or above `target` keeps its current percentage. Returns `Ok(false)`
    /// when no flag has this key.
    pub fn rollout_gradually(&self, key: &str, target: f64, step: f64) -> Result<bool> {
        let target = Percentage::named("target_percentage", target)?;
        if !(step > 0.0 && step <= 1.0) {
            return Err(FeatureError::invalid("step", step, "must be within (0, 1]"));
        }

        let Some(flag) = self.lookup(key) else {
            warn!(fields: { "flag" => key }, "Gradual rollout for unknown flag ignored");
            return Ok(false);
        };

        let mut current = flag.rollout_percentage();
        flag.set_strategy(
            RolloutStrategy::Percentage {
                percentage: Percentage::named("rollout_percentage", current)?,
            },
            self.clock.now(),
        );

        while current < target.value() {
            current = (current + step).min(target.value());
            let percentage = Percentage::named("rollout_percentage", current)?;
            flag.set_strategy(RolloutStrategy::Percentage { percentage }, self.clock.now());
            info!(fields: { "flag" => key }, "Flag {} rolled out to {}", key, percentage);
        }

        Ok(true)
    }

    /// Flag keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.flags.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// All flags, sorted by key
    pub fn flags(&self) -> Vec<Arc<FeatureFlag>> {
        let mut flags: Vec<Arc<FeatureFlag>> =
            self.flags.iter().map(|entry| Arc::clone(entry.value())).collect();
        flags.sort_by(|a, b| a.key().cmp(b.key()));
        flags
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Engine used by [`is_enabled`](Self::is_enabled)
    pub fn engine(&self) -> &TargetingEngine {
        &self.engine
    }
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagRegistry")
            .field("flags", &self.keys())
            .field("evaluations", &self.engine.evaluations())
            .finish()
    }
}
