//! Batch orchestrator: runs many test sets concurrently with a bounded pool.
//!
//! The worker pool is a process-wide semaphore with `P` slots. Each batch gets
//! a dispatcher task that walks its members in order and waits for a slot
//! before spawning each worker; tokio's semaphore queues waiters fairly, so
//! dispatch is FIFO within and across batches. Members are independent: a
//! failure is recorded on its own row and siblings keep running.
//!
//! Trackers are an in-memory cache of live progress. Finished batches are
//! dropped after the retention period and lookups then fall back to the
//! store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::models::{
    BatchItem, BatchLookup, BatchMemberSnapshot, BatchSnapshot, MemberPhase, RunStatus, WsEvent,
};

use super::executor::{ExecutionContext, ExecutionRequest, ProgressStore};

/// New batch identifier: `batch-<unix millis>-<random hex>`.
pub fn generate_batch_id() -> String {
    let suffix: u32 = rand::random();
    format!("batch-{}-{:08x}", Utc::now().timestamp_millis(), suffix)
}

struct MemberTracker {
    item: BatchItem,
    phase: MemberPhase,
}

struct BatchTracker {
    release_id: i32,
    executed_by: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    members: Vec<MemberTracker>,
}

impl BatchTracker {
    fn status(&self) -> RunStatus {
        RunStatus::precedence(self.members.iter().map(|m| m.phase.run_status()))
    }

    fn snapshot(&self, batch_id: &str, progress: &ProgressStore) -> BatchSnapshot {
        let count = |phase: MemberPhase| self.members.iter().filter(|m| m.phase == phase).count();

        BatchSnapshot {
            batch_id: batch_id.to_string(),
            release_id: self.release_id,
            executed_by: self.executed_by.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status(),
            total: self.members.len(),
            waiting: count(MemberPhase::Waiting),
            running: count(MemberPhase::Running),
            passed: count(MemberPhase::Passed),
            failed: count(MemberPhase::Failed),
            members: self
                .members
                .iter()
                .map(|m| BatchMemberSnapshot {
                    test_run_id: m.item.test_run_id,
                    test_set_id: m.item.test_set_id,
                    test_set_name: m.item.test_set_name.clone(),
                    phase: m.phase,
                    progress: match m.phase {
                        MemberPhase::Running => progress.get(m.item.test_run_id),
                        _ => None,
                    },
                })
                .collect(),
        }
    }
}

struct BatchInner {
    context: ExecutionContext,
    slots: Arc<Semaphore>,
    parallelism: usize,
    retention: Duration,
    batches: Mutex<HashMap<String, BatchTracker>>,
}

/// Bounded-parallelism scheduler for batch members.
#[derive(Clone)]
pub struct BatchOrchestrator {
    inner: Arc<BatchInner>,
}

impl BatchOrchestrator {
    pub fn new(context: ExecutionContext, parallelism: usize, retention: Duration) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            inner: Arc::new(BatchInner {
                context,
                slots: Arc::new(Semaphore::new(parallelism)),
                parallelism,
                retention,
                batches: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.inner.parallelism
    }

    /// Dispatch the members of a batch. Their run rows must already exist.
    ///
    /// Returns the member run ids immediately; execution continues in the
    /// background.
    pub fn start_batch(&self, batch_id: &str, items: Vec<BatchItem>, executed_by: &str) -> Vec<i32> {
        let test_run_ids: Vec<i32> = items.iter().map(|item| item.test_run_id).collect();
        if items.is_empty() {
            warn!(batch_id, "Ignoring empty batch");
            return test_run_ids;
        }

        let release_id = items[0].release_id;
        {
            let mut batches = self.inner.lock();
            self.inner.prune(&mut batches);
            batches.insert(
                batch_id.to_string(),
                BatchTracker {
                    release_id,
                    executed_by: executed_by.to_string(),
                    started_at: Utc::now(),
                    finished_at: None,
                    members: items
                        .iter()
                        .cloned()
                        .map(|item| MemberTracker {
                            item,
                            phase: MemberPhase::Waiting,
                        })
                        .collect(),
                },
            );
        }

        info!(
            batch_id,
            release_id,
            total = items.len(),
            parallelism = self.inner.parallelism,
            "Batch started"
        );
        self.inner
            .context
            .events
            .publish(WsEvent::batch_started(batch_id.to_string(), items.len()));

        let inner = Arc::clone(&self.inner);
        let batch_id = batch_id.to_string();
        tokio::spawn(async move { inner.dispatch(batch_id, items).await });

        test_run_ids
    }

    /// Live snapshot of a tracked batch, or `FallbackToStore` if not in memory.
    pub fn get_batch_status(&self, batch_id: &str) -> BatchLookup {
        let batches = self.inner.lock();
        match batches.get(batch_id) {
            Some(tracker) => {
                BatchLookup::Found(tracker.snapshot(batch_id, &self.inner.context.progress))
            }
            None => BatchLookup::FallbackToStore,
        }
    }

    /// Batches with at least one member not yet terminal, oldest first.
    pub fn get_active_batches(&self) -> Vec<BatchSnapshot> {
        let mut batches = self.inner.lock();
        self.inner.prune(&mut batches);

        let mut active: Vec<BatchSnapshot> = batches
            .iter()
            .map(|(id, tracker)| tracker.snapshot(id, &self.inner.context.progress))
            .filter(BatchSnapshot::is_active)
            .collect();
        active.sort_by_key(|snapshot| snapshot.started_at);
        active
    }
}

impl BatchInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, BatchTracker>> {
        self.batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop finished batches older than the retention period.
    fn prune(&self, batches: &mut HashMap<String, BatchTracker>) {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        batches.retain(|batch_id, tracker| match tracker.finished_at {
            Some(finished_at) if now - finished_at >= retention => {
                debug!(batch_id = %batch_id, "Dropping finished batch from memory");
                false
            }
            _ => true,
        });
    }

    fn set_phase(&self, batch_id: &str, test_run_id: i32, phase: MemberPhase) {
        let mut batches = self.lock();
        let Some(tracker) = batches.get_mut(batch_id) else {
            return;
        };
        if let Some(member) = tracker
            .members
            .iter_mut()
            .find(|m| m.item.test_run_id == test_run_id)
        {
            member.phase = phase;
        }

        if tracker.finished_at.is_none() && tracker.members.iter().all(|m| m.phase.is_terminal()) {
            tracker.finished_at = Some(Utc::now());
            let status = tracker.status();
            info!(batch_id, status = %status, "Batch completed");
            self.context
                .events
                .publish(WsEvent::batch_completed(batch_id.to_string(), status));
        }
    }

    /// Hand members to workers in order, one per free slot.
    async fn dispatch(self: Arc<Self>, batch_id: String, items: Vec<BatchItem>) {
        for item in items {
            let permit = match Arc::clone(&self.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(batch_id = %batch_id, "Worker pool closed, abandoning dispatch");
                    return;
                }
            };

            let test_run_id = item.test_run_id;
            self.set_phase(&batch_id, test_run_id, MemberPhase::Running);

            let inner = Arc::clone(&self);
            let batch_id = batch_id.clone();
            tokio::spawn(async move {
                let status = inner
                    .context
                    .run_to_completion(ExecutionRequest::from(&item), Some(&batch_id))
                    .await;
                drop(permit);

                let phase = match status {
                    RunStatus::Passed => MemberPhase::Passed,
                    _ => MemberPhase::Failed,
                };
                inner.set_phase(&batch_id, test_run_id, phase);
            });
        }
    }
}
