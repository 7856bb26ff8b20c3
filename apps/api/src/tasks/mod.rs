pub mod executor;
pub mod handlers;
pub mod queue;
pub mod runner;
pub mod signal;

use crate::errors::PipelineError;
use crate::models::work_item::{NewWorkItem, WorkItem};
use crate::tasks::queue::WorkQueue;
use crate::tasks::signal::QueueSignal;

/// Enqueues work and wakes an idle worker.
pub async fn submit(
    queue: &dyn WorkQueue,
    signal: &dyn QueueSignal,
    item: NewWorkItem,
) -> Result<WorkItem, PipelineError> {
    let queued = queue.enqueue(item).await?;
    signal.notify().await;
    Ok(queued)
}
