//! A/B experiments
//!
//! Users are split between two variants with the same bucketing used for
//! percentage rollouts, keyed on `experimentId:userId`. Assignment is
//! stable, so a conversion is always credited to the variant the user saw.

use crate::bucket::{bucket, experiment_bucket_key};
use crate::clock::{Clock, SystemClock};
use crate::error::{FeatureError, Result};
use crate::flag::Percentage;
use crate::user::User;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use vexil_log::{info, trace, warn};

/// Experiment identifier, `exp-<n>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    fn from_sequence(n: u64) -> Self {
        ExperimentId(format!("exp-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ExperimentId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ExperimentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Experiment arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    A,
    B,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::A => write!(f, "a"),
            Variant::B => write!(f, "b"),
        }
    }
}

#[derive(Debug, Default)]
struct VariantCounters {
    users: AtomicU64,
    conversions: AtomicU64,
}

/// A running experiment
#[derive(Debug)]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    variant_a_flag: String,
    variant_b_flag: String,
    split: Percentage,
    created_at: DateTime<Utc>,
    a: VariantCounters,
    b: VariantCounters,
}

impl Experiment {
    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flag label for variant A
    pub fn variant_a_flag(&self) -> &str {
        &self.variant_a_flag
    }

    /// Flag label for variant B
    pub fn variant_b_flag(&self) -> &str {
        &self.variant_b_flag
    }

    /// Share of users sent to variant A
    pub fn split(&self) -> f64 {
        self.split.value()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Variant for `user`, without counting anything
    pub fn variant_for(&self, user: &User) -> Variant {
        if bucket(&experiment_bucket_key(&self.id, &user.id)) < self.split.value() {
            Variant::A
        } else {
            Variant::B
        }
    }

    fn counters(&self, variant: Variant) -> &VariantCounters {
        match variant {
            Variant::A => &self.a,
            Variant::B => &self.b,
        }
    }

    fn assign(&self, user: &User) -> Variant {
        let variant = self.variant_for(user);
        self.counters(variant).users.fetch_add(1, Ordering::SeqCst);
        variant
    }

    /// Current counts and derived rates
    pub fn results(&self) -> ExperimentResults {
        ExperimentResults::from_counts(
            self.name.clone(),
            self.a.users.load(Ordering::SeqCst),
            self.a.conversions.load(Ordering::SeqCst),
            self.b.users.load(Ordering::SeqCst),
            self.b.conversions.load(Ordering::SeqCst),
        )
    }
}

/// Counts for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResults {
    /// Assignments, including those made while recording conversions
    pub users: u64,
    pub conversions: u64,
    /// `conversions / max(users, 1)`
    pub rate: f64,
}

impl VariantResults {
    fn new(users: u64, conversions: u64) -> Self {
        Self {
            users,
            conversions,
            rate: conversions as f64 / users.max(1) as f64,
        }
    }
}

/// Experiment outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub name: String,
    pub variant_a: VariantResults,
    pub variant_b: VariantResults,
    /// A only when its rate is strictly higher; ties go to B
    pub winner: Variant,
    /// `|rate_a - rate_b| / max(rate_a, rate_b)`, 0 when both rates are 0
    pub lift: f64,
}

impl ExperimentResults {
    /// Derive rates, winner and lift from raw counts
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_features::{ExperimentResults, Variant};
    ///
    /// let results = ExperimentResults::from_counts("checkout", 100, 20, 100, 10);
    /// assert_eq!(results.winner, Variant::A);
    /// assert!((results.lift - 0.5).abs() < 1e-9);
    /// ```
    pub fn from_counts(
        name: impl Into<String>,
        a_users: u64,
        a_conversions: u64,
        b_users: u64,
        b_conversions: u64,
    ) -> Self {
        let variant_a = VariantResults::new(a_users, a_conversions);
        let variant_b = VariantResults::new(b_users, b_conversions);

        let winner = if variant_a.rate > variant_b.rate {
            Variant::A
        } else {
            Variant::B
        };

        let best = variant_a.rate.max(variant_b.rate);
        let lift = if best > 0.0 {
            (variant_a.rate - variant_b.rate).abs() / best
        } else {
            0.0
        };

        Self {
            name: name.into(),
            variant_a,
            variant_b,
            winner,
            lift,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Creates experiments and tracks assignments and conversions
pub struct ExperimentEngine {
    experiments: DashMap<ExperimentId, Arc<Experiment>>,
    sequence: AtomicU64,
    default_split: Percentage,
    clock: Arc<dyn Clock>,
}

impl ExperimentEngine {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            experiments: DashMap::new(),
            sequence: AtomicU64::new(0),
            default_split: Percentage::HALF,
            clock,
        }
    }

    /// Split used by [`create_default`](Self::create_default)
    pub fn with_default_split(mut self, split: f64) -> Result<Self> {
        self.default_split = Percentage::named("split", split)?;
        Ok(self)
    }

    pub fn default_split(&self) -> f64 {
        self.default_split.value()
    }

    /// Start an experiment sending `split` of users to variant A
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_features::{ExperimentEngine, User};
    ///
    /// let engine = ExperimentEngine::new();
    /// let id = engine
    ///     .create_experiment("New Checkout", "old_checkout", "new_checkout", 0.5)
    ///     .unwrap();
    /// assert_eq!(id.as_str(), "exp-0");
    ///
    /// let user = User::new("1", "user1@test.com");
    /// let variant = engine.assign_variant(&id, &user).unwrap();
    /// assert_eq!(engine.record_conversion(&id, &user), Some(variant));
    /// ```
    pub fn create_experiment(
        &self,
        name: impl Into<String>,
        variant_a_flag: impl Into<String>,
        variant_b_flag: impl Into<String>,
        split: f64,
    ) -> Result<ExperimentId> {
        let split = Percentage::named("split", split)?;
        Ok(self.insert(name.into(), variant_a_flag.into(), variant_b_flag.into(), split))
    }

    /// Start an experiment with the engine's default split
    pub fn create_default(
        &self,
        name: impl Into<String>,
        variant_a_flag: impl Into<String>,
        variant_b_flag: impl Into<String>,
    ) -> ExperimentId {
        self.insert(
            name.into(),
            variant_a_flag.into(),
            variant_b_flag.into(),
            self.default_split,
        )
    }

    fn insert(
        &self,
        name: String,
        variant_a_flag: String,
        variant_b_flag: String,
        split: Percentage,
    ) -> ExperimentId {
        let id = ExperimentId::from_sequence(self.sequence.fetch_add(1, Ordering::SeqCst));

        info!(
            fields: { "experiment" => id, "split" => split },
            "Created A/B experiment: {}",
            name
        );

        let experiment = Experiment {
            id: id.clone(),
            name,
            variant_a_flag,
            variant_b_flag,
            split,
            created_at: self.clock.now(),
            a: VariantCounters::default(),
            b: VariantCounters::default(),
        };
        self.experiments.insert(id.clone(), Arc::new(experiment));

        id
    }

    /// Assign `user` to a variant and count the assignment
    ///
    /// Every call counts, including repeat calls for the same user.
    /// `None` if the experiment does not exist.
    pub fn assign_variant(&self, id: &str, user: &User) -> Option<Variant> {
        let Some(experiment) = self.lookup(id) else {
            warn!(fields: { "experiment" => id }, "Experiment not found");
            return None;
        };

        let variant = experiment.assign(user);
        trace!(
            fields: { "experiment" => id, "user" => user.id, "variant" => variant },
            "Assigned variant"
        );

        Some(variant)
    }

    /// Credit a conversion to the variant `user` is assigned to
    ///
    /// Re-derives the variant through [`assign_variant`](Self::assign_variant),
    /// so the variant's user count is bumped again as well.
    pub fn record_conversion(&self, id: &str, user: &User) -> Option<Variant> {
        let experiment = self.lookup(id)?;
        let variant = self.assign_variant(id, user)?;

        experiment
            .counters(variant)
            .conversions
            .fetch_add(1, Ordering::SeqCst);

        Some(variant)
    }

    /// Results so far, `None` if the experiment does not exist
    pub fn get_results(&self, id: &str) -> Option<ExperimentResults> {
        self.lookup(id).map(|experiment| experiment.results())
    }

    /// Typed lookup
    pub fn get(&self, id: &str) -> Result<Arc<Experiment>> {
        self.lookup(id)
            .ok_or_else(|| FeatureError::experiment_not_found(id))
    }

    /// Experiment ids in creation order
    pub fn ids(&self) -> Vec<ExperimentId> {
        let mut experiments: Vec<Arc<Experiment>> = self
            .experiments
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        experiments.sort_by_key(|experiment| sequence_of(&experiment.id));
        experiments.into_iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    fn lookup(&self, id: &str) -> Option<Arc<Experiment>> {
        self.experiments
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }
}

fn sequence_of(id: &ExperimentId) -> u64 {
    id.0.strip_prefix("exp-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

impl Default for ExperimentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExperimentEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentEngine")
            .field("experiments", &self.ids())
            .field("default_split", &self.default_split)
            .finish()
    }
}
