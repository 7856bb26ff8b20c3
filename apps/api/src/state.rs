use std::sync::Arc;

use crate::matching::scorer::MatchScorer;
use crate::matching::vector_index::VectorIndex;
use crate::screening::orchestrator::ScreeningOrchestrator;
use crate::store::{DocumentStore, Store};
use crate::tasks::queue::WorkQueue;
use crate::tasks::signal::QueueSignal;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn WorkQueue>,
    /// Wakes idle workers after an enqueue.
    pub signal: Arc<dyn QueueSignal>,
    pub documents: Arc<dyn DocumentStore>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub scorer: Arc<MatchScorer>,
    /// Used directly only for `?wait=true` screening; queued runs go through the workers.
    pub screening: Arc<ScreeningOrchestrator>,
}
