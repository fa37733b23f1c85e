//! Async audit storage backends
//!
//! Backends are driven by [`BackgroundSink`](crate::BackgroundSink), never
//! from the evaluation path.

use crate::AuditRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Audit log storage backend trait
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Append an audit record
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditBackendError>;

    /// Flush any pending writes
    async fn flush(&self) -> Result<(), AuditBackendError>;
}

/// Audit backend errors
#[derive(Debug, thiserror::Error)]
pub enum AuditBackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No Tokio runtime available to drive the audit writer")]
    NoRuntime,

    #[error("Audit writer has shut down")]
    Closed,
}

/// File-based audit backend
///
/// Appends records to a file, one JSON object per line.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Create a new file backend
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vexil_audit::*;
    ///
    /// let backend = FileBackend::new("kill-switch.log");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path the backend appends to
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl AuditBackend for FileBackend {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditBackendError> {
        let json = record.to_json()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditBackendError> {
        // Every write is flushed already
        Ok(())
    }
}

/// Stdout backend for development
pub struct StdoutBackend;

impl StdoutBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdoutBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditBackend for StdoutBackend {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditBackendError> {
        let json = record.to_json()?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditBackendError> {
        tokio::io::stdout().flush().await?;
        Ok(())
    }
}

/// Fans every record out to several backends in order
pub struct MultiBackend {
    backends: Vec<Box<dyn AuditBackend>>,
}

impl MultiBackend {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Add a backend
    pub fn with_backend(mut self, backend: impl AuditBackend + 'static) -> Self {
        self.backends.push(Box::new(backend));
        self
    }
}

impl Default for MultiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditBackend for MultiBackend {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditBackendError> {
        for backend in &self.backends {
            backend.write(record).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditBackendError> {
        for backend in &self.backends {
            backend.flush().await?;
        }
        Ok(())
    }
}
