//! Session store.
//!
//! The session is owned by a single task. Callers never touch it directly:
//! they send a read request or a mutation closure over a channel, and the
//! owning task applies mutations one at a time.
//!
//! A mutation runs against a draft copy. If it fails, the draft is thrown
//! away and the session is unchanged. If it succeeds and the draft differs
//! from the current session, the draft becomes current, `last_changed_at` is
//! stamped when the code or party changed, and a durable write is scheduled.

use crate::persist::DebouncedPersister;
use crate::session::Session;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// The store task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session store is no longer running")]
pub struct StoreClosed;

/// Output of a committed mutation plus the session as it now stands.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub output: T,
    pub snapshot: Session,
}

type Job = Box<dyn FnOnce(&mut Session, &DebouncedPersister) + Send>;

enum StoreCommand {
    Read(oneshot::Sender<Session>),
    Apply(Job),
}

/// Handle to the session-owning task.
#[derive(Clone)]
pub struct SessionStore {
    tx: mpsc::Sender<StoreCommand>,
}

impl SessionStore {
    /// Spawn the owning task with the initial session.
    pub fn spawn(initial: Session, persister: DebouncedPersister) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(run(initial, rx, persister));
        (Self { tx }, handle)
    }

    /// Current snapshot.
    pub async fn read(&self) -> Result<Session, StoreClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Read(reply_tx))
            .await
            .map_err(|_| StoreClosed)?;
        reply_rx.await.map_err(|_| StoreClosed)
    }

    /// Apply an infallible mutation.
    pub async fn mutate<F, T>(&self, f: F) -> Result<Committed<T>, StoreClosed>
    where
        F: FnOnce(&mut Session) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.try_mutate(move |session| Ok::<_, StoreClosed>(f(session)))
            .await
    }

    /// Apply a mutation that may reject. A rejection leaves the session untouched.
    pub async fn try_mutate<F, T, E>(&self, f: F) -> Result<Committed<T>, E>
    where
        F: FnOnce(&mut Session) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreClosed> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<Committed<T>, E>>();

        let job: Job = Box::new(move |session: &mut Session, persister: &DebouncedPersister| {
            let mut draft = session.clone();
            let result = f(&mut draft).map(|output| {
                if draft != *session {
                    if draft.tracked_fields_differ(session) {
                        draft.last_changed_at = Some(Utc::now());
                    }
                    *session = draft;
                    persister.schedule(session.clone());
                }
                Committed {
                    output,
                    snapshot: session.clone(),
                }
            });
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(StoreCommand::Apply(job))
            .await
            .map_err(|_| E::from(StoreClosed))?;
        reply_rx.await.map_err(|_| E::from(StoreClosed))?
    }
}

async fn run(
    mut session: Session,
    mut rx: mpsc::Receiver<StoreCommand>,
    persister: DebouncedPersister,
) {
    tracing::debug!("Session store started");

    while let Some(command) = rx.recv().await {
        match command {
            StoreCommand::Read(reply) => {
                let _ = reply.send(session.clone());
            }
            StoreCommand::Apply(job) => job(&mut session, &persister),
        }
    }

    tracing::debug!("Session store stopped");
}
