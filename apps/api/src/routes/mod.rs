pub mod extract;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::embedding::handlers as embedding;
use crate::matching::handlers as matching;
use crate::profile::handlers as profile;
use crate::screening::handlers as screening;
use crate::state::AppState;
use crate::tasks::handlers as tasks;

/// Every API call is scoped to one tenant.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

/// Multipart overhead on top of the 10 MiB resume cap.
const UPLOAD_BODY_LIMIT: usize = 11 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Candidates
        .route(
            "/api/v1/candidates/:id/resume",
            post(profile::handle_upload_resume).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/v1/candidates/:id/embedding",
            post(embedding::handle_refresh_candidate_embedding),
        )
        .route(
            "/api/v1/candidates/:id/similar-jobs",
            get(matching::handle_similar_jobs),
        )
        .route(
            "/api/v1/candidates/:id/similar-candidates",
            get(matching::handle_similar_candidates),
        )
        // Jobs
        .route(
            "/api/v1/jobs/:id/embedding",
            post(embedding::handle_refresh_job_embedding),
        )
        .route("/api/v1/jobs/:id/matches", get(matching::handle_job_matches))
        // Applications
        .route(
            "/api/v1/applications/:id/screen",
            post(screening::handle_screen_application),
        )
        .route(
            "/api/v1/applications/:id/assessment",
            get(screening::handle_get_assessment),
        )
        .route(
            "/api/v1/applications/:id/activities",
            get(screening::handle_list_activities),
        )
        // Background work
        .route("/api/v1/work-items/:id", get(tasks::handle_get_work_item))
        .with_state(state)
}
