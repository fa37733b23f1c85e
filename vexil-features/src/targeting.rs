//! Targeting engine
//!
//! Maps a flag and a user to on/off. The decision is a pure function of the
//! flag definition, the user and `now`; the only side effect of
//! [`evaluate`] is bumping the flag's counters.

use crate::bucket::{bucket, flag_bucket_key};
use crate::flag::{FeatureFlag, Percentage, RolloutStrategy, TargetSet};
use crate::user::User;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Gradual rollout speed: fraction of users added per elapsed hour
pub const GRADUAL_RAMP_PER_HOUR: f64 = 0.1;

/// Largest rollout a canary may carry and still turn on
pub const CANARY_MAX_PERCENTAGE: f64 = 0.05;

/// Evaluate `flag` for `user` at `now`, updating the flag's counters
///
/// Never fails; anything unexpected evaluates to `false`.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use vexil_features::{evaluate, FeatureFlag, User};
///
/// let flag = FeatureFlag::new("new_ui", "New UI", "", Utc::now()).with_enabled(true);
/// let user = User::new("1", "user1@test.com");
///
/// assert!(evaluate(&flag, &user, Utc::now()));
/// assert_eq!(flag.evaluations(), 1);
/// ```
pub fn evaluate(flag: &FeatureFlag, user: &User, now: DateTime<Utc>) -> bool {
    let enabled = flag.is_enabled();
    let result = flag.with_definition(|definition| {
        decide(
            flag.key(),
            enabled,
            &definition.strategy,
            flag.created_at(),
            user,
            now,
        )
    });

    flag.record_evaluation(result);

    vexil_log::trace!(
        fields: { "flag" => flag.key(), "user" => user.id, "enabled" => result },
        "Evaluated flag"
    );

    result
}

/// The decision [`evaluate`] makes, without touching any counters
pub fn decide(
    flag_key: &str,
    enabled: bool,
    strategy: &RolloutStrategy,
    created_at: DateTime<Utc>,
    user: &User,
    now: DateTime<Utc>,
) -> bool {
    if !enabled {
        return false;
    }

    match strategy {
        RolloutStrategy::AllUsers => true,
        RolloutStrategy::Targeted(targets) => matches_targets(targets, user),
        RolloutStrategy::Percentage { percentage } => {
            in_rollout(flag_key, &user.id, percentage.value())
        }
        RolloutStrategy::Gradual => {
            in_rollout(flag_key, &user.id, gradual_target(created_at, now).value())
        }
        RolloutStrategy::Canary { percentage } => {
            in_rollout(flag_key, &user.id, percentage.value())
                && percentage.value() <= CANARY_MAX_PERCENTAGE
        }
        RolloutStrategy::Unknown => false,
    }
}

/// Current gradual rollout target
///
/// 10 points per elapsed hour since creation, capped at 100%. A `now`
/// earlier than `created_at` counts as no time elapsed.
pub fn gradual_target(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Percentage {
    let elapsed_ms = (now - created_at).num_milliseconds().max(0);
    let elapsed_hours = elapsed_ms as f64 / 3_600_000.0;
    let target = (elapsed_hours * GRADUAL_RAMP_PER_HOUR).min(1.0);

    Percentage::new(target).unwrap_or(Percentage::FULL)
}

fn in_rollout(flag_key: &str, user_id: &str, percentage: f64) -> bool {
    bucket(&flag_bucket_key(flag_key, user_id)) < percentage
}

fn matches_targets(targets: &TargetSet, user: &User) -> bool {
    if targets.users.contains(&user.id) {
        return true;
    }

    if user.groups.iter().any(|group| targets.groups.contains(group)) {
        return true;
    }

    targets
        .attributes
        .iter()
        .any(|(name, expected)| user.attribute(name) == Some(expected))
}

/// Evaluates flags and counts how many evaluations it has performed
#[derive(Debug, Default)]
pub struct TargetingEngine {
    evaluations: AtomicU64,
}

impl TargetingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`evaluate`], also counted against this engine
    pub fn evaluate(&self, flag: &FeatureFlag, user: &User, now: DateTime<Utc>) -> bool {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        evaluate(flag, user, now)
    }

    /// Evaluations performed by this engine across all flags
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }
}
