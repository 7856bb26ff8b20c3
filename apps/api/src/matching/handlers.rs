use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::scorer::MatchResult;
use crate::matching::vector_index::IndexedKind;
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::state::AppState;

const MAX_LIMIT: usize = 200;

#[derive(Deserialize)]
pub struct RankingQuery {
    pub tenant_id: Uuid,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct MatchListResponse {
    pub job_id: Uuid,
    /// False while the job has no embedding: every similarity is 0.
    pub similarity_available: bool,
    pub candidates_scored: usize,
    pub matches: Vec<MatchResult>,
}

#[derive(Serialize)]
pub struct SimilarCandidate {
    pub candidate_id: Uuid,
    pub name: String,
    pub current_position: Option<String>,
    pub similarity: f64,
}

#[derive(Serialize)]
pub struct SimilarJob {
    pub job_id: Uuid,
    pub title: String,
    pub similarity: f64,
}

/// GET /api/v1/jobs/:id/matches
///
/// Scores the tenant's whole candidate pool, then truncates to `limit`.
pub async fn handle_job_matches(
    State(state): State<AppState>,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<RankingQuery>,
) -> Result<Json<MatchListResponse>, AppError> {
    let job = state
        .store
        .get_job(params.tenant_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;
    let pool = state.store.list_candidates(params.tenant_id).await?;

    let limit = params
        .limit
        .unwrap_or(state.scorer.config().default_limit)
        .clamp(1, MAX_LIMIT);
    let similarity_available = job.has_embedding();
    let candidates_scored = pool.len();

    let scorer = state.scorer.clone();
    let matches = tokio::task::spawn_blocking(move || scorer.rank(&job, &pool, limit))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("match scoring aborted: {e}")))?;

    Ok(Json(MatchListResponse {
        job_id,
        similarity_available,
        candidates_scored,
        matches,
    }))
}

/// The candidate's stored embedding, or 422 while it is still being computed.
async fn candidate_embedding(
    state: &AppState,
    tenant_id: Uuid,
    candidate_id: Uuid,
) -> Result<Vec<f32>, AppError> {
    let candidate = state
        .store
        .get_candidate(tenant_id, candidate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))?;

    candidate
        .embedding
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            AppError::UnprocessableEntity(format!(
                "Candidate {candidate_id} has no embedding yet"
            ))
        })
}

/// GET /api/v1/candidates/:id/similar-jobs
pub async fn handle_similar_jobs(
    State(state): State<AppState>,
    ApiPath(candidate_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<RankingQuery>,
) -> Result<Json<Vec<SimilarJob>>, AppError> {
    let embedding = candidate_embedding(&state, params.tenant_id, candidate_id).await?;

    let limit = params.limit.unwrap_or(10).clamp(1, MAX_LIMIT);
    let neighbors = state
        .vector_index
        .nearest(params.tenant_id, IndexedKind::Job, &embedding, limit, None)
        .await?;

    let mut jobs = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        // A job deleted between the scan and here is simply skipped.
        if let Some(job) = state.store.get_job(params.tenant_id, neighbor.id).await? {
            jobs.push(SimilarJob {
                job_id: job.id,
                title: job.title,
                similarity: neighbor.similarity,
            });
        }
    }

    Ok(Json(jobs))
}

/// GET /api/v1/candidates/:id/similar-candidates
///
/// Nearest candidates in the same tenant, never including the candidate itself.
pub async fn handle_similar_candidates(
    State(state): State<AppState>,
    ApiPath(candidate_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<RankingQuery>,
) -> Result<Json<Vec<SimilarCandidate>>, AppError> {
    let embedding = candidate_embedding(&state, params.tenant_id, candidate_id).await?;

    let limit = params.limit.unwrap_or(10).clamp(1, MAX_LIMIT);
    let neighbors = state
        .vector_index
        .nearest(
            params.tenant_id,
            IndexedKind::Candidate,
            &embedding,
            limit,
            Some(candidate_id),
        )
        .await?;

    let mut similar = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        if let Some(c) = state.store.get_candidate(params.tenant_id, neighbor.id).await? {
            similar.push(SimilarCandidate {
                candidate_id: c.id,
                name: c.display_name(),
                current_position: c.current_position,
                similarity: neighbor.similarity,
            });
        }
    }

    Ok(Json(similar))
}
