//! Feature flag system
//!
//! Wires the registry, kill switch, experiment engine and evaluation
//! tracker together from one [`FeaturesConfig`].

use crate::analytics::{flag_stats, EvaluationTracker, FlagStats};
use crate::clock::{Clock, SystemClock};
use crate::config::FeaturesConfig;
use crate::error::Result;
use crate::experiment::ExperimentEngine;
use crate::kill_switch::KillSwitch;
use crate::registry::FlagRegistry;
use crate::user::User;
use std::sync::Arc;
use vexil_audit::{AuditSink, NullSink};
use vexil_log::warn;

/// Everything needed to serve flags, kill switches and experiments
///
/// # Examples
///
/// ```
/// use vexil_features::{FlagSystem, FlagUpdate, User};
///
/// let system = FlagSystem::new();
/// system.registry().create("new_ui", "New UI", "");
/// system
///     .registry()
///     .update("new_ui", FlagUpdate::new().enabled(true))
///     .unwrap();
///
/// let user = User::new("1", "user1@test.com");
/// assert!(system.is_enabled("new_ui", &user));
///
/// system.kill_switch().activate("new_ui", "Performance issues detected");
/// assert!(!system.is_enabled("new_ui", &user));
/// ```
pub struct FlagSystem {
    config: FeaturesConfig,
    registry: Arc<FlagRegistry>,
    kill_switch: KillSwitch,
    experiments: ExperimentEngine,
    tracker: EvaluationTracker,
}

impl FlagSystem {
    /// System with default configuration, the system clock and no audit sink
    pub fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let experiments = ExperimentEngine::with_clock(Arc::clone(&clock));
        Self::assemble(FeaturesConfig::default(), clock, Arc::new(NullSink), experiments)
    }

    pub fn builder() -> FlagSystemBuilder {
        FlagSystemBuilder::default()
    }

    fn assemble(
        config: FeaturesConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AuditSink>,
        experiments: ExperimentEngine,
    ) -> Self {
        let registry = Arc::new(FlagRegistry::with_clock(clock));
        let kill_switch =
            KillSwitch::with_sink(Arc::clone(&registry), sink).forwarding(config.audit_enabled);
        let tracker = EvaluationTracker::with_capacity(config.max_tracked_events);

        Self {
            config,
            registry,
            kill_switch,
            experiments,
            tracker,
        }
    }

    /// Evaluate a flag for a user
    ///
    /// Unknown flags evaluate to `false`. The evaluation is recorded in the
    /// tracker when `track_evaluations` is set.
    pub fn is_enabled(&self, key: &str, user: &User) -> bool {
        let Some(flag) = self.registry.lookup(key) else {
            warn!(fields: { "flag" => key }, "Flag not found, returning false");
            return false;
        };

        let now = self.registry.clock().now();
        let enabled = self.registry.engine().evaluate(&flag, user, now);

        if self.config.track_evaluations {
            self.tracker.track(key, user.id.as_str(), enabled, now);
        }

        enabled
    }

    /// Stats for every flag, sorted by key
    pub fn stats(&self) -> Vec<FlagStats> {
        self.registry
            .flags()
            .iter()
            .map(|flag| flag_stats(flag))
            .collect()
    }

    /// Stats for one flag, `None` if it does not exist
    pub fn flag_stats(&self, key: &str) -> Option<FlagStats> {
        self.registry.lookup(key).map(|flag| flag_stats(&flag))
    }

    pub fn config(&self) -> &FeaturesConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    pub fn experiments(&self) -> &ExperimentEngine {
        &self.experiments
    }

    pub fn tracker(&self) -> &EvaluationTracker {
        &self.tracker
    }
}

impl Default for FlagSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlagSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagSystem")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("experiments", &self.experiments)
            .finish()
    }
}

/// Builder for [`FlagSystem`]
#[derive(Default)]
pub struct FlagSystemBuilder {
    config: Option<FeaturesConfig>,
    clock: Option<Arc<dyn Clock>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl FlagSystemBuilder {
    pub fn config(mut self, config: FeaturesConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sink receiving kill switch records when `audit_enabled` is set
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Validate the configuration and build the system
    pub fn build(self) -> Result<FlagSystem> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink = self.audit_sink.unwrap_or_else(|| Arc::new(NullSink));

        let experiments = ExperimentEngine::with_clock(Arc::clone(&clock))
            .with_default_split(config.default_split)?;

        Ok(FlagSystem::assemble(config, clock, sink, experiments))
    }
}
