use axum::{extract::State, Json};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::work_item::WorkItem;
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::routes::TenantQuery;
use crate::state::AppState;

/// GET /api/v1/work-items/:id
pub async fn handle_get_work_item(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TenantQuery>,
) -> Result<Json<WorkItem>, AppError> {
    let item = state
        .queue
        .get(params.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Work item {id} not found")))?;
    Ok(Json(item))
}
