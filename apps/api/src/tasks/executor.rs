//! Executes one claimed work item. Returns a typed outcome; never decides retry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::embedding::EmbeddingGateway;
use crate::errors::PipelineError;
use crate::models::work_item::{NewWorkItem, WorkItem, WorkKind};
use crate::profile::document::{SourceFormat, TextExtractor};
use crate::profile::extractor::ProfileExtractor;
use crate::profile::normalizer::normalize;
use crate::screening::orchestrator::ScreeningOrchestrator;
use crate::store::{DocumentStore, Store};
use crate::tasks::queue::WorkQueue;
use crate::tasks::signal::QueueSignal;
use crate::tasks::submit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The entity moved on to a newer generation; nothing was written.
    Discarded(String),
}

#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn execute(&self, item: &WorkItem) -> Result<Outcome, PipelineError>;
}

pub struct PipelineExecutor {
    store: Arc<dyn Store>,
    documents: Arc<dyn DocumentStore>,
    text_extractor: Arc<dyn TextExtractor>,
    profile_extractor: ProfileExtractor,
    embeddings: Arc<EmbeddingGateway>,
    screening: Arc<ScreeningOrchestrator>,
    queue: Arc<dyn WorkQueue>,
    signal: Arc<dyn QueueSignal>,
}

impl PipelineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        documents: Arc<dyn DocumentStore>,
        text_extractor: Arc<dyn TextExtractor>,
        profile_extractor: ProfileExtractor,
        embeddings: Arc<EmbeddingGateway>,
        screening: Arc<ScreeningOrchestrator>,
        queue: Arc<dyn WorkQueue>,
        signal: Arc<dyn QueueSignal>,
    ) -> Self {
        Self {
            store,
            documents,
            text_extractor,
            profile_extractor,
            embeddings,
            screening,
            queue,
            signal,
        }
    }

    /// fetch document → extract text → normalize → LLM extract → guarded write
    /// → queue the candidate embedding for the same generation.
    async fn parse_resume(&self, item: &WorkItem) -> Result<Outcome, PipelineError> {
        let candidate = self
            .store
            .get_candidate(item.tenant_id, item.target_id)
            .await?
            .ok_or_else(|| missing("candidate", item))?;
        if candidate.resume_generation != item.generation {
            return Ok(superseded(item, candidate.resume_generation));
        }

        let document = self
            .store
            .get_resume_document(item.tenant_id, item.target_id)
            .await?
            .ok_or_else(|| {
                PipelineError::InputUnavailable(format!(
                    "candidate {} has no uploaded resume",
                    item.target_id
                ))
            })?;

        let bytes = self.documents.get(&document.key).await?.ok_or_else(|| {
            PipelineError::InputUnavailable(format!("resume object {} is missing", document.key))
        })?;

        let raw = self
            .text_extractor
            .extract_text(bytes, &document.filename)
            .await
            .ok_or_else(|| {
                PipelineError::InputUnavailable(format!(
                    "no text could be extracted from {}",
                    document.filename
                ))
            })?;

        let normalized = normalize(&raw, SourceFormat::from_filename(&document.filename));
        let parsed = self.profile_extractor.extract(&normalized).await?;

        let applied = self
            .store
            .apply_parsed_resume(item.tenant_id, item.target_id, item.generation, &parsed)
            .await?;
        if !applied {
            return Ok(Outcome::Discarded(format!(
                "resume generation {} superseded while parsing",
                item.generation
            )));
        }

        info!(
            "Parsed resume for candidate {} (generation {}, quality {:.0})",
            item.target_id, item.generation, parsed.quality_score
        );

        submit(
            self.queue.as_ref(),
            self.signal.as_ref(),
            NewWorkItem {
                tenant_id: item.tenant_id,
                kind: WorkKind::EmbedCandidate,
                target_id: item.target_id,
                generation: item.generation,
            },
        )
        .await?;

        Ok(Outcome::Completed)
    }

    async fn embed_candidate(&self, item: &WorkItem) -> Result<Outcome, PipelineError> {
        let candidate = self
            .store
            .get_candidate(item.tenant_id, item.target_id)
            .await?
            .ok_or_else(|| missing("candidate", item))?;
        if candidate.resume_generation != item.generation {
            return Ok(superseded(item, candidate.resume_generation));
        }

        let embedding = self.embeddings.embed_candidate(&candidate).await?;

        let written = self
            .store
            .set_candidate_embedding(item.tenant_id, item.target_id, item.generation, &embedding)
            .await?;
        if !written {
            return Ok(Outcome::Discarded(format!(
                "candidate generation {} superseded while embedding",
                item.generation
            )));
        }
        Ok(Outcome::Completed)
    }

    async fn embed_job(&self, item: &WorkItem) -> Result<Outcome, PipelineError> {
        let job = self
            .store
            .get_job(item.tenant_id, item.target_id)
            .await?
            .ok_or_else(|| missing("job", item))?;
        if job.content_generation != item.generation {
            return Ok(superseded(item, job.content_generation));
        }

        let embedding = self.embeddings.embed_job(&job).await?;

        let written = self
            .store
            .set_job_embedding(item.tenant_id, item.target_id, item.generation, &embedding)
            .await?;
        if !written {
            return Ok(Outcome::Discarded(format!(
                "job generation {} superseded while embedding",
                item.generation
            )));
        }
        Ok(Outcome::Completed)
    }
}

#[async_trait]
impl WorkExecutor for PipelineExecutor {
    async fn execute(&self, item: &WorkItem) -> Result<Outcome, PipelineError> {
        match item.kind {
            WorkKind::ParseResume => self.parse_resume(item).await,
            WorkKind::EmbedCandidate => self.embed_candidate(item).await,
            WorkKind::EmbedJob => self.embed_job(item).await,
            WorkKind::ScreenApplication => {
                self.screening.screen(item.tenant_id, item.target_id).await?;
                Ok(Outcome::Completed)
            }
        }
    }
}

fn missing(entity: &str, item: &WorkItem) -> PipelineError {
    PipelineError::DataInconsistency(format!(
        "{entity} {} no longer exists ({} item {})",
        item.target_id, item.kind, item.id
    ))
}

fn superseded(item: &WorkItem, current: i64) -> Outcome {
    warn!(
        "Discarding {} for {}: generation {} is stale (current {current})",
        item.kind, item.target_id, item.generation
    );
    Outcome::Discarded(format!(
        "generation {} superseded by {current}",
        item.generation
    ))
}
