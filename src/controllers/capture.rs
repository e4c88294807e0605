use crate::analysis::{apply_batch, AnalysisClient, BatchPlan, BatchSummary};
use crate::cancel::CancelOnDrop;
use crate::domain::AnalysisResult;
use crate::error::StoreError;
use crate::store::{RowStore, Schema};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// An analysed transcript waiting for confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub result: AnalysisResult,
    pub plan: BatchPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapturePhase {
    Editing,
    Analyzing,
    Review(Box<Review>),
    Applying,
    Done(BatchSummary),
    Failed(String),
}

impl CapturePhase {
    pub fn label(&self) -> &'static str {
        match self {
            CapturePhase::Editing => "editing",
            CapturePhase::Analyzing => "analyzing",
            CapturePhase::Review(_) => "review",
            CapturePhase::Applying => "saving",
            CapturePhase::Done(_) => "saved",
            CapturePhase::Failed(_) => "failed",
        }
    }
}

enum WorkerMessage {
    Analyzed(AnalysisResult),
    Applied(Result<BatchSummary, StoreError>),
}

/// Capture screen: transcript in, reviewed batch out.
///
/// Analysis and the batch write each run on a worker thread and report back
/// over a channel read by `poll`.
pub struct CaptureController {
    analysis: Arc<AnalysisClient>,
    store: Arc<dyn RowStore>,
    schema: Arc<Schema>,
    pub transcript: String,
    phase: CapturePhase,
    rx: Option<Receiver<WorkerMessage>>,
    lifetime: CancelOnDrop,
}

impl CaptureController {
    pub fn new(analysis: Arc<AnalysisClient>, store: Arc<dyn RowStore>, schema: Arc<Schema>) -> Self {
        Self {
            analysis,
            store,
            schema,
            transcript: String::new(),
            phase: CapturePhase::Editing,
            rx: None,
            lifetime: CancelOnDrop::new(),
        }
    }

    pub fn phase(&self) -> &CapturePhase {
        &self.phase
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, CapturePhase::Analyzing | CapturePhase::Applying)
    }

    /// Start analysing the transcript in the background
    pub fn submit(&mut self) -> bool {
        if self.is_busy() || matches!(self.phase, CapturePhase::Review(_)) {
            return false;
        }
        let transcript = self.transcript.trim().to_string();
        if transcript.is_empty() {
            debug!("empty transcript not submitted");
            return false;
        }

        let (tx, rx) = mpsc::channel();
        let analysis = Arc::clone(&self.analysis);
        let token = self.lifetime.token();
        thread::spawn(move || {
            let result = analysis.analyze(&transcript);
            if token.is_cancelled() {
                debug!("capture left, analysis result discarded");
                return;
            }
            let _ = tx.send(WorkerMessage::Analyzed(result));
        });

        self.rx = Some(rx);
        self.phase = CapturePhase::Analyzing;
        true
    }

    /// Write the reviewed batch for `user_id` in the background
    pub fn confirm(&mut self, user_id: &str, first_position: i64) -> bool {
        let CapturePhase::Review(review) = &self.phase else {
            return false;
        };
        let plan = review.plan.clone();
        let transcript = self.transcript.trim().to_string();
        let user_id = user_id.to_string();

        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);
        let schema = Arc::clone(&self.schema);
        let token = self.lifetime.token();
        thread::spawn(move || {
            let result = apply_batch(
                store.as_ref(),
                &user_id,
                &transcript,
                &plan,
                &schema,
                first_position,
                &token,
            );
            if token.is_cancelled() {
                return;
            }
            let _ = tx.send(WorkerMessage::Applied(result));
        });

        self.rx = Some(rx);
        self.phase = CapturePhase::Applying;
        true
    }

    /// Pick up a finished worker result. Returns true if the phase changed.
    pub fn poll(&mut self) -> bool {
        let Some(rx) = &self.rx else {
            return false;
        };
        let message = match rx.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                if self.is_busy() {
                    warn!("capture worker exited without a result");
                    self.phase = CapturePhase::Failed("background work stopped".to_string());
                    return true;
                }
                return false;
            }
        };
        self.rx = None;

        self.phase = match message {
            WorkerMessage::Analyzed(result) => {
                let plan = BatchPlan::from_result(&result);
                info!(
                    projects = plan.projects.len(),
                    tasks = plan.tasks.len(),
                    unresolved = plan.unresolved.len(),
                    "transcript analysed"
                );
                CapturePhase::Review(Box::new(Review { result, plan }))
            }
            WorkerMessage::Applied(Ok(summary)) => CapturePhase::Done(summary),
            WorkerMessage::Applied(Err(e)) => CapturePhase::Failed(e.to_string()),
        };
        true
    }

    /// Abandon background work; late results are dropped
    pub fn cancel(&mut self) {
        if self.is_busy() || matches!(self.phase, CapturePhase::Review(_)) {
            debug!(phase = self.phase.label(), "capture cancelled");
            self.phase = CapturePhase::Editing;
        }
        self.lifetime.reset();
        self.rx = None;
    }

    /// Back to an empty transcript once a batch is done or failed
    pub fn reset(&mut self) {
        if matches!(self.phase, CapturePhase::Done(_)) {
            self.transcript.clear();
        }
        if !self.is_busy() {
            self.phase = CapturePhase::Editing;
        }
    }
}
