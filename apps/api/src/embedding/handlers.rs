use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::work_item::{NewWorkItem, WorkItem, WorkKind};
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::routes::TenantQuery;
use crate::state::AppState;
use crate::tasks::submit;

/// POST /api/v1/jobs/:id/embedding
///
/// Invalidates the current embedding and queues a rebuild. CRUD paths call this
/// whenever `job_content_changed` reports an edit to embedded fields.
pub async fn handle_refresh_job_embedding(
    State(state): State<AppState>,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TenantQuery>,
) -> Result<(StatusCode, Json<WorkItem>), AppError> {
    let generation = state
        .store
        .invalidate_job_embedding(params.tenant_id, job_id)
        .await?;

    let item = submit(
        state.queue.as_ref(),
        state.signal.as_ref(),
        NewWorkItem {
            tenant_id: params.tenant_id,
            kind: WorkKind::EmbedJob,
            target_id: job_id,
            generation,
        },
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(item)))
}

/// POST /api/v1/candidates/:id/embedding
pub async fn handle_refresh_candidate_embedding(
    State(state): State<AppState>,
    ApiPath(candidate_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TenantQuery>,
) -> Result<(StatusCode, Json<WorkItem>), AppError> {
    let candidate = state
        .store
        .get_candidate(params.tenant_id, candidate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))?;

    let item = submit(
        state.queue.as_ref(),
        state.signal.as_ref(),
        NewWorkItem {
            tenant_id: params.tenant_id,
            kind: WorkKind::EmbedCandidate,
            target_id: candidate_id,
            generation: candidate.resume_generation,
        },
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(item)))
}
