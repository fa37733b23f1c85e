// Vexil - Deterministic feature flag evaluation for Rust
//
// This library bundles the flag registry, targeting engine, kill switches and
// A/B experiments together with the logging and audit crates they report to.

// Re-export core functionality
pub use vexil_features::*;

// Re-export supporting crates
pub use vexil_audit;
pub use vexil_log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        // Audit types
        vexil_audit::{AuditRecord, AuditSink, BackgroundSink, FileBackend, MemorySink},
        Clock,
        ExperimentEngine,
        ExperimentId,
        FeatureError,
        FeatureFlag,
        FeaturesConfig,
        FlagRegistry,
        FlagSystem,
        FlagUpdate,
        KillSwitch,
        ManualClock,
        RolloutStrategy,
        SystemClock,
        TargetSet,
        User,
        Variant,
        evaluate,
        flag_stats,
    };
}
