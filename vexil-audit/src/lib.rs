//! Audit trail for Vexil
//!
//! Every kill switch activation and release becomes an [`AuditRecord`]
//! appended to an [`AuditSink`]. Sinks are fire-and-forget: recording never
//! blocks and never fails the operator's request.
//!
//! # Features
//!
//! - **Audit Records** - Structured, serializable kill switch events
//! - **Sinks** - In-memory, null, and background (Tokio) sinks
//! - **Backends** - JSON-lines file, stdout, and fan-out storage
//!
//! # Quick Start
//!
//! ```no_run
//! use vexil_audit::*;
//!
//! # async fn example() -> Result<(), AuditBackendError> {
//! let (sink, _writer) = BackgroundSink::spawn(FileBackend::new("audit.log"))?;
//!
//! sink.record(
//!     AuditRecord::new("new_ui", AuditAction::KillSwitchActivated)
//!         .reason("Performance issues detected")
//!         .severity(AuditSeverity::Critical),
//! );
//! sink.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod record;
pub mod sink;

pub use backend::*;
pub use record::*;
pub use sink::*;
