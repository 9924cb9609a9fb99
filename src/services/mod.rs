//! Scheduling and execution services.

pub mod artifacts;
pub mod batch;
pub mod concurrency;
pub mod event_broadcaster;
pub mod execution_queue;
pub mod executor;
pub mod runner_client;

#[cfg(test)]
pub(crate) mod test_support;

pub use artifacts::{ArtifactStore, PdfRenderer, PdfService};
pub use batch::{BatchOrchestrator, generate_batch_id};
pub use concurrency::ExecutionGate;
pub use event_broadcaster::EventBroadcaster;
pub use execution_queue::{Enqueued, ExecutionQueue};
pub use executor::{
    ExecutionContext, ExecutionRequest, ExecutorError, ProgressReporter, ProgressStore,
    TestSetExecutor,
};
pub use runner_client::RunnerClient;
