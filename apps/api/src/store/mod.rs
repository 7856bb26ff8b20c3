//! Persistence seams consumed by the pipeline. Every read and write is tenant scoped.
//!
//! Pipeline-owned fields (parsed profile, embeddings, assessments) are only ever
//! written through the generation- or state-guarded methods here.

pub mod documents;
pub mod postgres;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::activity::{ActivityRow, NewActivity};
use crate::models::application::{Application, ApplicationAssessment};
use crate::models::candidate::CandidateProfile;
use crate::models::job::JobPosting;
use crate::profile::extractor::ParsedProfile;

/// Where the latest uploaded resume for a candidate lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeDocument {
    pub key: String,
    pub filename: String,
    pub generation: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<CandidateProfile>, PipelineError>;

    /// The full tenant pool, oldest first.
    async fn list_candidates(&self, tenant_id: Uuid)
        -> Result<Vec<CandidateProfile>, PipelineError>;

    async fn get_job(&self, tenant_id: Uuid, job_id: Uuid)
        -> Result<Option<JobPosting>, PipelineError>;

    async fn get_application(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<Application>, PipelineError>;

    async fn list_activities(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<Vec<ActivityRow>, PipelineError>;

    /// Records a newly uploaded resume and bumps `resume_generation`.
    /// Returns the new generation; in-flight work for older generations becomes stale.
    async fn begin_resume_generation(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        document_key: &str,
        filename: &str,
    ) -> Result<i64, PipelineError>;

    async fn get_resume_document(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<ResumeDocument>, PipelineError>;

    /// Writes the parsed profile if `generation` is still current. Contact fields
    /// only fill blanks, and the previous resume's embedding is cleared.
    /// Returns false when the write was discarded as stale.
    async fn apply_parsed_resume(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        generation: i64,
        parsed: &ParsedProfile,
    ) -> Result<bool, PipelineError>;

    /// Returns false when `generation` is no longer the candidate's resume generation.
    async fn set_candidate_embedding(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        generation: i64,
        embedding: &[f32],
    ) -> Result<bool, PipelineError>;

    /// Clears the job embedding and bumps `content_generation`, returning the new value.
    async fn invalidate_job_embedding(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<i64, PipelineError>;

    /// Returns false when `generation` is no longer the job's content generation.
    async fn set_job_embedding(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        generation: i64,
        embedding: &[f32],
    ) -> Result<bool, PipelineError>;

    /// Atomically moves the application into `screening_in_progress` and returns
    /// the new run's id. Only that run may complete or fail the screening.
    ///
    /// Fails with `ConcurrencyConflict` if a run started after `stale_before` is
    /// still in progress, and `DataInconsistency` if the application is gone.
    async fn begin_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> Result<Uuid, PipelineError>;

    /// Overwrites every assessment field at once and marks the application screened.
    /// `ConcurrencyConflict` if `run_id` has been taken over by a newer run.
    async fn complete_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        run_id: Uuid,
        assessment: &ApplicationAssessment,
    ) -> Result<(), PipelineError>;

    /// Marks the run failed. The previous assessment is left untouched.
    /// `ConcurrencyConflict` if `run_id` has been taken over by a newer run.
    async fn fail_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        run_id: Uuid,
        error: &str,
    ) -> Result<(), PipelineError>;
}

/// Append-only audit log. Fire-and-forget: failures are logged, never surfaced.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, activity: NewActivity);
}

/// Raw resume bytes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), PipelineError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, PipelineError>;

    async fn delete(&self, key: &str) -> Result<(), PipelineError>;
}
