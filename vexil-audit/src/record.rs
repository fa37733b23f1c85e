//! Audit record structures and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to the flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Kill switch engaged, flag forced off
    KillSwitchActivated,
    /// Kill switch released, flag forced back on
    KillSwitchDeactivated,
}

impl AuditAction {
    /// Stable name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::KillSwitchActivated => "kill_switch_activated",
            AuditAction::KillSwitchDeactivated => "kill_switch_deactivated",
        }
    }
}

/// Severity level for audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Informational records
    Info,
    /// Warning records
    Warning,
    /// Critical records
    Critical,
}

/// One append-only audit entry.
///
/// Records are immutable once built; sinks only ever append them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record ID
    pub id: String,

    /// Flag the action was applied to
    pub flag_key: String,

    /// Action performed
    pub action: AuditAction,

    /// Operator-supplied reason, if any
    pub reason: Option<String>,

    /// Who triggered the action
    pub actor: Option<String>,

    /// Severity level
    pub severity: AuditSeverity,

    /// When the action was applied
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a new audit record stamped with the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_audit::*;
    ///
    /// let record = AuditRecord::new("new_ui", AuditAction::KillSwitchActivated)
    ///     .reason("Performance issues detected")
    ///     .severity(AuditSeverity::Critical);
    ///
    /// assert_eq!(record.flag_key, "new_ui");
    /// ```
    pub fn new(flag_key: impl Into<String>, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            flag_key: flag_key.into(),
            action,
            reason: None,
            actor: None,
            severity: AuditSeverity::Info,
            timestamp: Utc::now(),
        }
    }

    /// Set the reason
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the actor
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set severity
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Override the timestamp (used when the caller owns the clock)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Convert to a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new("new_ui", AuditAction::KillSwitchActivated)
            .reason("latency")
            .actor("oncall")
            .severity(AuditSeverity::Critical);

        assert_eq!(record.flag_key, "new_ui");
        assert_eq!(record.action, AuditAction::KillSwitchActivated);
        assert_eq!(record.reason.as_deref(), Some("latency"));
        assert_eq!(record.actor.as_deref(), Some("oncall"));
        assert_eq!(record.severity, AuditSeverity::Critical);
    }

    #[test]
    fn test_audit_record_ids_are_unique() {
        let a = AuditRecord::new("f", AuditAction::KillSwitchActivated);
        let b = AuditRecord::new("f", AuditAction::KillSwitchActivated);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_audit_record_json_shape() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = AuditRecord::new("new_ui", AuditAction::KillSwitchDeactivated).at(when);

        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["flag_key"], "new_ui");
        assert_eq!(value["action"], "kill_switch_deactivated");
        assert_eq!(value["severity"], "info");
        assert_eq!(value["timestamp"], "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_audit_severity_ordering() {
        assert!(AuditSeverity::Info < AuditSeverity::Warning);
        assert!(AuditSeverity::Warning < AuditSeverity::Critical);
    }
}
