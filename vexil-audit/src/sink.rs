//! Fire-and-forget audit sinks
//!
//! [`AuditSink::record`] is synchronous and infallible from the caller's
//! point of view. Kill switch operations must never block on, or fail
//! because of, audit storage.

use crate::{AuditBackend, AuditBackendError, AuditRecord};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Append-only destination for audit records
pub trait AuditSink: Send + Sync {
    /// Append a record. No response is consumed.
    fn record(&self, record: AuditRecord);
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn record(&self, record: AuditRecord) {
        (**self).record(record)
    }
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn record(&self, _record: AuditRecord) {}
}

/// In-memory sink, mostly for tests
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemorySink {
    /// Create an empty memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

enum Command {
    Write(AuditRecord),
    Flush(oneshot::Sender<()>),
}

/// Sink that hands records to a Tokio task driving an [`AuditBackend`]
///
/// `record` only enqueues; the writer task persists records in order.
/// Backend errors are logged by the task and dropped.
#[derive(Clone)]
pub struct BackgroundSink {
    sender: mpsc::UnboundedSender<Command>,
}

impl BackgroundSink {
    /// Spawn the writer task on the current Tokio runtime
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vexil_audit::*;
    ///
    /// # async fn example() -> Result<(), AuditBackendError> {
    /// let (sink, writer) = BackgroundSink::spawn(FileBackend::new("kill-switch.log"))?;
    ///
    /// sink.record(AuditRecord::new("new_ui", AuditAction::KillSwitchActivated));
    /// sink.flush().await?;
    ///
    /// drop(sink);
    /// writer.await.ok();
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(
        backend: impl AuditBackend + 'static,
    ) -> Result<(Self, JoinHandle<()>), AuditBackendError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| AuditBackendError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = handle.spawn(run_writer(Box::new(backend), receiver));
        Ok((Self { sender }, writer))
    }

    /// Wait until every record enqueued before this call has been written
    pub async fn flush(&self) -> Result<(), AuditBackendError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(Command::Flush(done))
            .map_err(|_| AuditBackendError::Closed)?;
        wait.await.map_err(|_| AuditBackendError::Closed)
    }

    /// Whether the writer task is still accepting records
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl AuditSink for BackgroundSink {
    fn record(&self, record: AuditRecord) {
        let flag_key = record.flag_key.clone();
        if self.sender.send(Command::Write(record)).is_err() {
            vexil_log::error!(
                fields: { "flag" => flag_key },
                "Audit writer has shut down, record dropped"
            );
        }
    }
}

async fn run_writer(
    backend: Box<dyn AuditBackend>,
    mut receiver: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Write(record) => {
                if let Err(e) = backend.write(&record).await {
                    vexil_log::error!(
                        fields: { "flag" => record.flag_key, "action" => record.action.as_str() },
                        "Failed to write audit record: {}",
                        e
                    );
                }
            }
            Command::Flush(done) => {
                if let Err(e) = backend.flush().await {
                    vexil_log::error!("Failed to flush audit backend: {}", e);
                }
                let _ = done.send(());
            }
        }
    }

    if let Err(e) = backend.flush().await {
        vexil_log::error!("Failed to flush audit backend on shutdown: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditAction, FileBackend};

    #[test]
    fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let clone = sink.clone();

        sink.record(AuditRecord::new("a", AuditAction::KillSwitchActivated));
        clone.record(AuditRecord::new("b", AuditAction::KillSwitchDeactivated));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].flag_key, "a");
        assert_eq!(records[1].flag_key, "b");
    }

    #[test]
    fn test_arc_sink_delegates() {
        let sink = Arc::new(MemorySink::new());
        let shared: Arc<dyn AuditSink> = sink.clone();

        shared.record(AuditRecord::new("a", AuditAction::KillSwitchActivated));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = BackgroundSink::spawn(FileBackend::new(dir.path().join("a.log")));
        assert!(matches!(result, Err(AuditBackendError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_background_sink_writes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let (sink, writer) = BackgroundSink::spawn(FileBackend::new(&path)).unwrap();

        for i in 0..5 {
            sink.record(AuditRecord::new(format!("flag-{}", i), AuditAction::KillSwitchActivated));
        }
        sink.flush().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let keys: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<AuditRecord>(l).unwrap().flag_key)
            .collect();
        assert_eq!(keys, vec!["flag-0", "flag-1", "flag-2", "flag-3", "flag-4"]);

        drop(sink);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_background_sink_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, writer) =
            BackgroundSink::spawn(FileBackend::new(dir.path().join("audit.log"))).unwrap();

        writer.abort();
        let _ = writer.await;

        assert!(!sink.is_open());
        // Dropped silently; the caller never sees the failure
        sink.record(AuditRecord::new("late", AuditAction::KillSwitchActivated));
        assert!(matches!(sink.flush().await, Err(AuditBackendError::Closed)));
    }
}
