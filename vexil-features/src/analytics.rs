//! Flag analytics
//!
//! [`flag_stats`] derives rates from a flag's own counters. The
//! [`EvaluationTracker`] keeps a bounded window of individual evaluation
//! events for drill-down.

use crate::flag::FeatureFlag;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default tracker capacity
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Counter summary for one flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagStats {
    pub key: String,
    pub evaluations: u64,
    pub enabled_count: u64,
    /// `enabled_count / max(evaluations, 1)`
    pub enabled_rate: f64,
    pub rollout_percentage: f64,
    pub target_user_count: usize,
}

impl FlagStats {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Summarise a flag's counters
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use vexil_features::{evaluate, flag_stats, FeatureFlag, User};
///
/// let flag = FeatureFlag::new("f", "F", "", Utc::now());
/// let stats = flag_stats(&flag);
/// assert_eq!(stats.enabled_rate, 0.0);
///
/// let flag = flag.with_enabled(true);
/// evaluate(&flag, &User::new("1", "user1@test.com"), Utc::now());
/// assert_eq!(flag_stats(&flag).enabled_rate, 1.0);
/// ```
pub fn flag_stats(flag: &FeatureFlag) -> FlagStats {
    let snapshot = flag.snapshot();

    FlagStats {
        key: snapshot.key,
        evaluations: snapshot.evaluations,
        enabled_count: snapshot.enabled_count,
        enabled_rate: snapshot.enabled_count as f64 / snapshot.evaluations.max(1) as f64,
        rollout_percentage: snapshot.strategy.rollout_percentage(),
        target_user_count: snapshot.strategy.target_user_count(),
    }
}

/// One recorded evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEvent {
    pub flag_key: String,
    pub user_id: String,
    pub enabled: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over the events still held for one flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub evaluations: u64,
    pub enabled: u64,
    pub unique_users: usize,
}

/// Bounded log of evaluation events
///
/// Holds at most `capacity` events; the oldest is dropped to make room.
#[derive(Debug)]
pub struct EvaluationTracker {
    events: RwLock<VecDeque<EvaluationEvent>>,
    capacity: usize,
    total_tracked: AtomicU64,
}

impl EvaluationTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    /// A capacity of 0 is raised to 1
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_MAX_EVENTS))),
            capacity,
            total_tracked: AtomicU64::new(0),
        }
    }

    /// Record an evaluation
    pub fn track(
        &self,
        flag_key: impl Into<String>,
        user_id: impl Into<String>,
        enabled: bool,
        timestamp: DateTime<Utc>,
    ) {
        let event = EvaluationEvent {
            flag_key: flag_key.into(),
            user_id: user_id.into(),
            enabled,
            timestamp,
        };

        let mut events = self.events.write();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        self.total_tracked.fetch_add(1, Ordering::Relaxed);
    }

    /// Up to `limit` most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<EvaluationEvent> {
        self.events.read().iter().rev().take(limit).cloned().collect()
    }

    /// Summary of held events for a flag, `None` if there are none
    pub fn summary(&self, flag_key: &str) -> Option<EvaluationSummary> {
        let events = self.events.read();
        let mut evaluations = 0;
        let mut enabled = 0;
        let mut users = HashSet::new();

        for event in events.iter().filter(|e| e.flag_key == flag_key) {
            evaluations += 1;
            if event.enabled {
                enabled += 1;
            }
            users.insert(event.user_id.as_str());
        }

        (evaluations > 0).then(|| EvaluationSummary {
            evaluations,
            enabled,
            unique_users: users.len(),
        })
    }

    /// Events currently held
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events ever tracked, including dropped ones
    pub fn total_tracked(&self) -> u64 {
        self.total_tracked.load(Ordering::Relaxed)
    }

    /// Drop all held events
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl Default for EvaluationTracker {
    fn default() -> Self {
        Self::new()
    }
}
