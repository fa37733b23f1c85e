//! Feature Flags for Vexil
//!
//! Deterministic feature flag evaluation with staged rollouts, emergency
//! kill switches and A/B experiments.
//!
//! # Features
//!
//! - **Rollout strategies** - all users, percentage, targeted, gradual, canary
//! - **Consistent bucketing** - the same user lands in the same bucket on
//!   every replica
//! - **Kill switches** - force a flag off, with an append-only audit trail
//! - **A/B experiments** - stable assignment and conversion tracking
//! - **Analytics** - per-flag counters and a bounded evaluation log
//!
//! # Quick Start
//!
//! ```
//! use vexil_features::*;
//!
//! let registry = FlagRegistry::new();
//! registry.create("new_ui", "New UI Design", "Redesigned interface");
//! registry
//!     .update(
//!         "new_ui",
//!         FlagUpdate::new()
//!             .enabled(true)
//!             .strategy(RolloutStrategy::percentage(0.25).unwrap()),
//!     )
//!     .unwrap();
//!
//! let user = User::new("1", "user1@test.com").with_group("premium");
//! let enabled = registry.is_enabled("new_ui", &user);
//!
//! // Same answer every time for the same user
//! assert_eq!(enabled, registry.is_enabled("new_ui", &user));
//! ```
//!
//! # Targeting
//!
//! ```
//! use vexil_features::*;
//!
//! let strategy = RolloutStrategy::targeted(
//!     TargetSet::new()
//!         .with_group("premium")
//!         .with_group("enterprise")
//!         .with_attribute("country", "NZ"),
//! );
//! assert_eq!(strategy.name(), "targeted");
//! ```
//!
//! # A/B Testing
//!
//! ```
//! use vexil_features::*;
//!
//! let engine = ExperimentEngine::new();
//! let id = engine
//!     .create_experiment("New Checkout", "old_checkout", "new_checkout", 0.5)
//!     .unwrap();
//!
//! for i in 0..100 {
//!     let user = User::new(i.to_string(), format!("user{}@test.com", i));
//!     engine.assign_variant(&id, &user);
//!     if i % 10 == 0 {
//!         engine.record_conversion(&id, &user);
//!     }
//! }
//!
//! let results = engine.get_results(&id).unwrap();
//! assert!(results.lift >= 0.0);
//! ```

pub mod analytics;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod experiment;
pub mod flag;
pub mod kill_switch;
pub mod registry;
pub mod system;
pub mod targeting;
pub mod user;

pub use analytics::{
    flag_stats, EvaluationEvent, EvaluationSummary, EvaluationTracker, FlagStats,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FeaturesConfig, FeaturesConfigBuilder};
pub use error::{EntityKind, FeatureError, Result};
pub use experiment::{
    Experiment, ExperimentEngine, ExperimentId, ExperimentResults, Variant, VariantResults,
};
pub use flag::{
    FeatureFlag, FlagDefinition, FlagSnapshot, FlagUpdate, Percentage, RolloutStrategy, TargetSet,
};
pub use kill_switch::KillSwitch;
pub use registry::FlagRegistry;
pub use system::{FlagSystem, FlagSystemBuilder};
pub use targeting::{evaluate, TargetingEngine};
pub use user::{AttributeValue, User};
