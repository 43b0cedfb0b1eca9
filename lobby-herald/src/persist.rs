//! Debounced persistence.
//!
//! Mutations are coalesced into one durable write after a quiet period. There
//! is a single pending slot: scheduling while a write is pending replaces the
//! snapshot and restarts the timer.
//!
//! ```text
//! schedule(s1) ─┐
//! schedule(s2) ─┼─ quiet period ─► write(s3)
//! schedule(s3) ─┘
//! ```

use crate::session::Session;
use crate::snapshot::DurableSnapshot;
use async_trait::async_trait;
use lobby_common::error::{Error, ResultExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Destination of durable writes.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write(&self, snapshot: &DurableSnapshot) -> lobby_common::Result<()>;
}

/// Writes the snapshot as JSON, replacing the file atomically.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotSink for JsonFileSink {
    async fn write(&self, snapshot: &DurableSnapshot) -> lobby_common::Result<()> {
        let content = serde_json::to_vec(snapshot).context("serializing session snapshot")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("creating {}", parent.display()))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content)
            .await
            .context(format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .context(format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

enum PersistCommand {
    Schedule(Box<Session>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the debounce task.
#[derive(Clone)]
pub struct DebouncedPersister {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl DebouncedPersister {
    /// Spawn the debounce task.
    pub fn spawn(sink: Arc<dyn SnapshotSink>, quiet: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(debounce_loop(rx, sink, quiet));
        (Self { tx }, handle)
    }

    /// Replace the pending snapshot and restart the quiet period.
    pub fn schedule(&self, snapshot: Session) {
        if self
            .tx
            .send(PersistCommand::Schedule(Box::new(snapshot)))
            .is_err()
        {
            tracing::error!("Persister task is gone, session change will not be saved");
        }
    }

    /// Write any pending snapshot now and wait for it.
    pub async fn flush(&self) -> lobby_common::Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(PersistCommand::Flush(ack_tx))
            .map_err(|_| Error::ChannelSend)?;
        ack_rx.await.map_err(|_| Error::ChannelSend)
    }
}

async fn write_snapshot(sink: &dyn SnapshotSink, session: &Session) {
    let snapshot = DurableSnapshot::from_session(session);
    match sink.write(&snapshot).await {
        Ok(()) => tracing::info!("Session saved"),
        Err(e) => tracing::error!(error = %e, "Failed to save session"),
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    sink: Arc<dyn SnapshotSink>,
    quiet: Duration,
) {
    let mut pending: Option<Box<Session>> = None;

    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    // Quiet period elapsed
                    if let Some(session) = pending.take() {
                        write_snapshot(sink.as_ref(), &session).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(PersistCommand::Schedule(session)) => {
                if pending.is_some() {
                    tracing::debug!("Superseding pending session write");
                }
                pending = Some(session);
            }
            Some(PersistCommand::Flush(ack)) => {
                if let Some(session) = pending.take() {
                    write_snapshot(sink.as_ref(), &session).await;
                }
                let _ = ack.send(());
            }
            None => {
                if let Some(session) = pending.take() {
                    tracing::info!("Persister closing, writing pending session");
                    write_snapshot(sink.as_ref(), &session).await;
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MessageId, PartyOccupancy};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        writes: Mutex<Vec<DurableSnapshot>>,
    }

    impl MemorySink {
        fn writes(&self) -> Vec<DurableSnapshot> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SnapshotSink for MemorySink {
        async fn write(&self, snapshot: &DurableSnapshot) -> lobby_common::Result<()> {
            self.writes.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl SnapshotSink for FailingSink {
        async fn write(&self, _snapshot: &DurableSnapshot) -> lobby_common::Result<()> {
            Err(Error::Io(std::io::Error::other("disk on fire")))
        }
    }

    fn session_with_party(current: u32) -> Session {
        Session {
            party: PartyOccupancy::new(current, 4),
            ..Session::default()
        }
    }

    const QUIET: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_write_of_latest_state() {
        let sink = Arc::new(MemorySink::default());
        let (persister, _task) = DebouncedPersister::spawn(sink.clone(), QUIET);

        for current in 0..5 {
            persister.schedule(session_with_party(current));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(sink.writes().is_empty());

        tokio::time::sleep(QUIET * 2).await;
        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].party_info.as_deref(), Some("4/4"));
    }

    #[tokio::test(start_paused = true)]
    async fn separate_quiet_periods_write_separately() {
        let sink = Arc::new(MemorySink::default());
        let (persister, _task) = DebouncedPersister::spawn(sink.clone(), QUIET);

        persister.schedule(session_with_party(1));
        tokio::time::sleep(QUIET * 2).await;
        persister.schedule(session_with_party(2));
        tokio::time::sleep(QUIET * 2).await;

        let parties: Vec<_> = sink
            .writes()
            .into_iter()
            .map(|w| w.party_info.unwrap_or_default())
            .collect();
        assert_eq!(parties, vec!["1/4".to_string(), "2/4".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_pending_snapshot_immediately() {
        let sink = Arc::new(MemorySink::default());
        let (persister, _task) = DebouncedPersister::spawn(sink.clone(), QUIET);

        let session = Session {
            status_message: Some(MessageId(5)),
            ..session_with_party(3)
        };
        persister.schedule(session);
        persister.flush().await.unwrap();

        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].message_id, Some(5));

        // Nothing left for the timer
        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(sink.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_without_pending_is_noop() {
        let sink = Arc::new(MemorySink::default());
        let (persister, _task) = DebouncedPersister::spawn(sink.clone(), QUIET);
        persister.flush().await.unwrap();
        assert!(sink.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_flushes_pending() {
        let sink = Arc::new(MemorySink::default());
        let (persister, task) = DebouncedPersister::spawn(sink.clone(), QUIET);
        persister.schedule(session_with_party(2));
        drop(persister);
        task.await.unwrap();
        assert_eq!(sink.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_keeps_task_alive() {
        let (persister, _task) = DebouncedPersister::spawn(Arc::new(FailingSink), QUIET);
        persister.schedule(session_with_party(1));
        tokio::time::sleep(QUIET * 2).await;
        persister.schedule(session_with_party(2));
        assert!(persister.flush().await.is_ok());
    }

    #[tokio::test]
    async fn json_file_sink_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("code_data.json");
        let sink = JsonFileSink::new(&path);

        sink.write(&DurableSnapshot::from_session(&session_with_party(1)))
            .await
            .unwrap();
        sink.write(&DurableSnapshot::from_session(&session_with_party(3)))
            .await
            .unwrap();

        let loaded = crate::snapshot::load_session(&path);
        assert_eq!(loaded.party, PartyOccupancy::new(3, 4));
        assert!(!sink.temp_path().exists());
    }
}
