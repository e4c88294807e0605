use crate::cancel::CancelToken;
use crate::error::StoreError;
use crate::store::{RowStore, Schema};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra attempts for transient failures
pub const MAX_RETRIES: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(150);
const LOG_CAPACITY: usize = 50;
const TEMP_PREFIX: &str = "tmp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    CreateProject,
    RenameProject,
    DeleteProject,
    RestoreProject,
    CreateStep,
    RenameStep,
    ToggleStep,
    DeleteStep,
    RestoreStep,
    Reorder,
    CompleteTask,
}

/// What became of an optimistic mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Pending,
    Applied,
    Retrying { attempt: u32 },
    /// The remote call failed and the local change was undone
    Reverted { reason: String },
    /// The owner went away; the result was ignored
    Discarded,
}

impl OpOutcome {
    pub fn of(result: &Result<Reply, StoreError>) -> Self {
        match result {
            Ok(_) => OpOutcome::Applied,
            Err(StoreError::Cancelled) => OpOutcome::Discarded,
            Err(e) => OpOutcome::Reverted {
                reason: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
    pub id: u64,
    pub kind: OpKind,
    pub target: String,
    pub outcome: OpOutcome,
}

/// Recent mutations and their outcomes, newest last
#[derive(Debug, Default)]
pub struct OpLog {
    ops: VecDeque<PendingOp>,
    next_id: u64,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, kind: OpKind, target: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.ops.push_back(PendingOp {
            id,
            kind,
            target: target.to_string(),
            outcome: OpOutcome::Pending,
        });
        if self.ops.len() > LOG_CAPACITY {
            self.ops.pop_front();
        }
        id
    }

    pub fn settle(&mut self, id: u64, outcome: OpOutcome) {
        if let Some(op) = self.ops.iter_mut().find(|op| op.id == id) {
            op.outcome = outcome;
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PendingOp> {
        self.ops.iter()
    }

    /// True while some call is being retried after a transient failure
    pub fn is_retrying(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op.outcome, OpOutcome::Retrying { .. }))
    }
}

/// Ids for rows that were shown locally before the store assigned one
pub fn temp_id() -> String {
    format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_PREFIX)
}

/// Store ids of rows created under a temporary id.
///
/// Owned by the worker thread, so calls queued behind a create can refer
/// to the row by the id the UI handed out.
#[derive(Debug, Default)]
pub struct IdMap {
    ids: HashMap<String, String>,
}

impl IdMap {
    pub fn record(&mut self, temp: &str, stored: &str) {
        self.ids.insert(temp.to_string(), stored.to_string());
    }

    /// The stored id for `id`; a temp id whose create never landed is an error
    pub fn resolve(&self, id: &str) -> Result<String, StoreError> {
        match self.ids.get(id) {
            Some(stored) => Ok(stored.clone()),
            None if is_temp_id(id) => Err(StoreError::Unresolved(id.to_string())),
            None => Ok(id.to_string()),
        }
    }
}

/// What a finished remote call hands back to its controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    /// Id the store gave a new row
    Created(String),
    /// Ids of a re-created project and its steps, in order
    Restored { project: String, steps: Vec<String> },
}

/// A finished operation, as reported by a controller's `poll`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub kind: OpKind,
    pub outcome: OpOutcome,
}

pub type RemoteCall =
    Box<dyn FnMut(&dyn RowStore, &Schema, &mut IdMap) -> Result<Reply, StoreError> + Send>;

struct Job {
    op: u64,
    token: CancelToken,
    call: RemoteCall,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Retrying { op: u64, attempt: u32 },
    Finished { op: u64, result: Result<Reply, StoreError> },
}

/// One background thread running a controller's remote calls in order.
///
/// Calls are retried on the worker; the UI thread only queues them and
/// picks up `WorkerEvent`s. The thread exits once the worker is dropped.
pub struct RemoteWorker {
    jobs: Sender<Job>,
    events: Receiver<WorkerEvent>,
}

impl RemoteWorker {
    pub fn spawn(store: Arc<dyn RowStore>, schema: Arc<Schema>) -> Self {
        let (jobs, job_rx) = mpsc::channel::<Job>();
        let (event_tx, events) = mpsc::channel();
        thread::spawn(move || {
            let mut ids = IdMap::default();
            for mut job in job_rx {
                let op = job.op;
                let result = run_remote(
                    op,
                    &job.token,
                    || (job.call)(store.as_ref(), &schema, &mut ids),
                    |attempt| {
                        let _ = event_tx.send(WorkerEvent::Retrying { op, attempt });
                    },
                );
                if event_tx.send(WorkerEvent::Finished { op, result }).is_err() {
                    break;
                }
            }
            debug!("remote worker stopped");
        });
        Self { jobs, events }
    }

    /// Queue a call; false if the worker thread is gone
    pub fn submit(&self, op: u64, token: CancelToken, call: RemoteCall) -> bool {
        self.jobs.send(Job { op, token, call }).is_ok()
    }

    pub fn try_next(&self) -> Option<WorkerEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("remote worker exited");
                None
            }
        }
    }
}

/// Run one remote call, retrying transient failures up to `MAX_RETRIES`
/// times with a growing pause. A cancelled token turns any result into
/// `StoreError::Cancelled`.
pub fn run_remote<T, F, R>(op: u64, cancel: &CancelToken, mut call: F, mut on_retry: R) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
    R: FnMut(u32),
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let result = call();
        if cancel.is_cancelled() {
            debug!(op, "owner cancelled, discarding result");
            return Err(StoreError::Cancelled);
        }
        match result {
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                warn!(op, attempt, error = %e, "remote call failed, retrying");
                on_retry(attempt);
                thread::sleep(RETRY_BACKOFF * attempt);
            }
            Err(e) => {
                warn!(op, error = %e, "remote call failed");
                return Err(e);
            }
            Ok(value) => return Ok(value),
        }
    }
}
