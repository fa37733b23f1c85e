//! Emergency kill switches
//!
//! Activation forces a flag off and appends an audit record. The in-process
//! history is append-only and never truncated.

use crate::registry::FlagRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use vexil_audit::{AuditAction, AuditRecord, AuditSeverity, AuditSink, NullSink};
use vexil_log::{critical, info, warn};

/// Operator override for flags held by a [`FlagRegistry`]
pub struct KillSwitch {
    registry: Arc<FlagRegistry>,
    history: Mutex<Vec<AuditRecord>>,
    sink: Arc<dyn AuditSink>,
    forward: bool,
}

impl KillSwitch {
    /// Kill switch that keeps its history in process only
    pub fn new(registry: Arc<FlagRegistry>) -> Self {
        Self::with_sink(registry, Arc::new(NullSink))
    }

    /// Kill switch that also forwards every record to `sink`
    pub fn with_sink(registry: Arc<FlagRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            registry,
            history: Mutex::new(Vec::new()),
            sink,
            forward: true,
        }
    }

    /// Stop forwarding records to the sink; history is still kept
    pub fn forwarding(mut self, forward: bool) -> Self {
        self.forward = forward;
        self
    }

    /// Force a flag off
    ///
    /// Returns `false` without recording anything if the flag is unknown.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use vexil_features::{FlagRegistry, KillSwitch};
    ///
    /// let registry = Arc::new(FlagRegistry::new());
    /// registry.create("new_ui", "New UI", "");
    ///
    /// let kill_switch = KillSwitch::new(registry.clone());
    /// assert!(kill_switch.activate("new_ui", "Performance issues detected"));
    /// assert!(!registry.get("new_ui").unwrap().is_enabled());
    /// assert_eq!(kill_switch.history().len(), 1);
    /// ```
    pub fn activate(&self, flag_key: &str, reason: &str) -> bool {
        let Some(flag) = self.registry.lookup(flag_key) else {
            warn!(fields: { "flag" => flag_key }, "Kill switch target not found");
            return false;
        };

        flag.set_enabled(false);

        let record = AuditRecord::new(flag_key, AuditAction::KillSwitchActivated)
            .reason(reason)
            .severity(AuditSeverity::Critical)
            .at(self.registry.clock().now());
        self.append(record);

        critical!(
            fields: { "flag" => flag_key, "reason" => reason },
            "KILL SWITCH ACTIVATED: {} - Reason: {}",
            flag_key,
            reason
        );

        true
    }

    /// Force a flag back on
    ///
    /// Returns `false` if the flag is unknown.
    pub fn deactivate(&self, flag_key: &str) -> bool {
        let Some(flag) = self.registry.lookup(flag_key) else {
            warn!(fields: { "flag" => flag_key }, "Kill switch target not found");
            return false;
        };

        flag.set_enabled(true);

        let record = AuditRecord::new(flag_key, AuditAction::KillSwitchDeactivated)
            .at(self.registry.clock().now());
        self.append(record);

        info!(fields: { "flag" => flag_key }, "Kill switch deactivated: {}", flag_key);

        true
    }

    /// All records so far, oldest first
    pub fn history(&self) -> Vec<AuditRecord> {
        self.history.lock().clone()
    }

    /// Whether `flag_key` is currently held off by this kill switch
    ///
    /// True when the most recent action on the flag was an activation and
    /// the flag is still disabled. Turning the flag back on through
    /// [`FlagRegistry::update`] releases it without a history entry.
    pub fn is_active(&self, flag_key: &str) -> bool {
        let activated = self
            .history
            .lock()
            .iter()
            .rev()
            .find(|record| record.flag_key == flag_key)
            .is_some_and(|record| record.action == AuditAction::KillSwitchActivated);

        activated
            && self
                .registry
                .lookup(flag_key)
                .is_some_and(|flag| !flag.is_enabled())
    }

    fn append(&self, record: AuditRecord) {
        if self.forward {
            self.sink.record(record.clone());
        }
        self.history.lock().push(record);
    }
}

impl std::fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillSwitch")
            .field("records", &self.history.lock().len())
            .field("forward", &self.forward)
            .finish()
    }
}
