use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::activity::ActivityRow;
use crate::models::application::Application;
use crate::models::work_item::{NewWorkItem, WorkKind};
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::routes::TenantQuery;
use crate::state::AppState;
use crate::tasks::submit;

#[derive(Deserialize)]
pub struct ScreenQuery {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub wait: bool,
}

/// POST /api/v1/applications/:id/screen
///
/// Queues a screening run (202), or runs it inline with `?wait=true` (200).
pub async fn handle_screen_application(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ScreenQuery>,
) -> Result<Response, AppError> {
    if params.wait {
        let outcome = state.screening.screen(params.tenant_id, id).await?;
        return Ok(Json(outcome).into_response());
    }

    state
        .store
        .get_application(params.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;

    let item = submit(
        state.queue.as_ref(),
        state.signal.as_ref(),
        NewWorkItem {
            tenant_id: params.tenant_id,
            kind: WorkKind::ScreenApplication,
            target_id: id,
            generation: 0,
        },
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(item)).into_response())
}

/// GET /api/v1/applications/:id/assessment
pub async fn handle_get_assessment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TenantQuery>,
) -> Result<Json<Application>, AppError> {
    let application = state
        .store
        .get_application(params.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;
    Ok(Json(application))
}

/// GET /api/v1/applications/:id/activities
pub async fn handle_list_activities(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TenantQuery>,
) -> Result<Json<Vec<ActivityRow>>, AppError> {
    let activities = state.store.list_activities(params.tenant_id, id).await?;
    Ok(Json(activities))
}
