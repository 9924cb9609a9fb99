//! Serial execution queue for single test-set runs.
//!
//! At most one item runs at a time. `enqueue` never blocks: it appends to the
//! pending list and, when idle, promotes the head and spawns a drive loop.
//! The drive loop promotes the next pending item only after the current one
//! has been persisted in a terminal state, so promotion is strictly FIFO.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::models::{ProgressUpdate, QueueItem, QueueSnapshot, WsEvent};

use super::executor::{ExecutionContext, ExecutionRequest};

/// Where an enqueued run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Promoted immediately (or already the running item).
    Running,
    /// Waiting; 1-based position in the pending list.
    Pending(usize),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueItem>,
    running: Option<QueueItem>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    context: ExecutionContext,
}

/// Serial scheduler owned by the application state.
#[derive(Clone)]
pub struct ExecutionQueue {
    inner: Arc<QueueInner>,
}

impl ExecutionQueue {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                context,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock()
    }

    /// Add a run to the queue.
    ///
    /// A run id that is already pending or running is not added twice; its
    /// current state is returned instead.
    pub fn enqueue(&self, item: QueueItem) -> Enqueued {
        let test_run_id = item.test_run_id;

        let (enqueued, start) = {
            let mut state = self.lock();

            if state
                .running
                .as_ref()
                .is_some_and(|running| running.test_run_id == test_run_id)
            {
                warn!(test_run_id, "Run is already executing, ignoring duplicate enqueue");
                return Enqueued::Running;
            }
            if let Some(index) = state
                .pending
                .iter()
                .position(|pending| pending.test_run_id == test_run_id)
            {
                warn!(test_run_id, "Run is already queued, ignoring duplicate enqueue");
                return Enqueued::Pending(index + 1);
            }

            if state.running.is_none() {
                state.running = Some(item.clone());
                (Enqueued::Running, Some(item))
            } else {
                state.pending.push_back(item);
                (Enqueued::Pending(state.pending.len()), None)
            }
        };

        let position = match enqueued {
            Enqueued::Pending(position) => Some(position),
            Enqueued::Running => None,
        };
        info!(test_run_id, ?position, "Run enqueued");
        self.inner
            .context
            .events
            .publish(WsEvent::run_queued(test_run_id, position));

        if let Some(first) = start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drive(first).await });
        }

        enqueued
    }

    /// Pending items in FIFO order plus the running item.
    pub fn get_status(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            pending: state.pending.iter().cloned().collect(),
            running_item: state.running.clone(),
        }
    }

    pub fn is_running(&self, test_run_id: i32) -> bool {
        self.lock()
            .running
            .as_ref()
            .is_some_and(|item| item.test_run_id == test_run_id)
    }

    /// 1-based position of a pending run.
    pub fn position_of(&self, test_run_id: i32) -> Option<usize> {
        self.lock()
            .pending
            .iter()
            .position(|item| item.test_run_id == test_run_id)
            .map(|index| index + 1)
    }

    /// Latest progress reported for a run, if any.
    pub fn get_progress(&self, test_run_id: i32) -> Option<ProgressUpdate> {
        self.inner.context.progress.get(test_run_id)
    }
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run items one after another until the pending list is empty.
    async fn drive(self: Arc<Self>, first: QueueItem) {
        let mut current = first;
        loop {
            self.context
                .run_to_completion(ExecutionRequest::from(&current), None)
                .await;

            let next = {
                let mut state = self.lock();
                state.running = state.pending.pop_front();
                state.running.clone()
            };

            match next {
                Some(item) => {
                    debug!(test_run_id = item.test_run_id, "Promoting next queued run");
                    current = item;
                }
                None => {
                    debug!("Execution queue drained");
                    break;
                }
            }
        }
    }
}
