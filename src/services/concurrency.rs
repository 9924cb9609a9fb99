//! Optional execution budget shared by the serial queue and the batch pool.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many executions may run at once across both scheduling domains.
///
/// Unbounded gates hand out no permits and never wait.
#[derive(Clone, Default)]
pub struct ExecutionGate {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<usize>,
}

impl ExecutionGate {
    pub fn unbounded() -> Self {
        Self {
            semaphore: None,
            limit: None,
        }
    }

    pub fn bounded(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Some(Arc::new(Semaphore::new(limit))),
            limit: Some(limit),
        }
    }

    /// Gate for `TPO_MAX_GLOBAL_CONCURRENCY`; `None` keeps the domains independent.
    pub fn from_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(limit) => Self::bounded(limit),
            None => Self::unbounded(),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Wait for a slot. The returned permit frees the slot when dropped.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}
