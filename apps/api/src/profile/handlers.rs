use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::work_item::{NewWorkItem, WorkItem, WorkKind};
use crate::profile::document::SourceFormat;
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::routes::TenantQuery;
use crate::state::AppState;
use crate::tasks::submit;

/// Uploads larger than this are rejected before touching storage.
const MAX_RESUME_BYTES: usize = 10 * 1024 * 1024;

/// POST /api/v1/candidates/:id/resume
///
/// Stores the document, bumps the candidate's resume generation and queues
/// parsing. Any parse still in flight for an older upload becomes stale.
pub async fn handle_upload_resume(
    State(state): State<AppState>,
    ApiPath(candidate_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<TenantQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<WorkItem>), AppError> {
    let tenant_id = params.tenant_id;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("resume.txt").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Invalid file: {e}")))?;
            upload = Some((filename, data));
            break;
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::Validation("Missing multipart field 'file'".to_string()))?;
    if data.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if data.len() > MAX_RESUME_BYTES {
        return Err(AppError::Validation(format!(
            "Resume exceeds {} bytes",
            MAX_RESUME_BYTES
        )));
    }

    let format = SourceFormat::from_filename(&filename);
    let key = format!(
        "resumes/{tenant_id}/{candidate_id}/{}-{}",
        Uuid::new_v4(),
        safe_filename(&filename)
    );
    state.documents.put(&key, data, format.content_type()).await?;

    // Also the existence check: an unknown candidate comes back as not found.
    let generation = match state
        .store
        .begin_resume_generation(tenant_id, candidate_id, &key, &filename)
        .await
    {
        Ok(generation) => generation,
        Err(e) => {
            if let Err(cleanup) = state.documents.delete(&key).await {
                error!("Orphaned resume object {key}: {cleanup}");
            }
            return Err(e.into());
        }
    };

    let item = submit(
        state.queue.as_ref(),
        state.signal.as_ref(),
        NewWorkItem {
            tenant_id,
            kind: WorkKind::ParseResume,
            target_id: candidate_id,
            generation,
        },
    )
    .await
    .map_err(|e| {
        error!(
            "Resume generation {generation} stored for candidate {candidate_id} \
             but its parse was not queued: {e}"
        );
        e
    })?;

    info!("Queued resume parse for candidate {candidate_id} (generation {generation})");
    Ok((StatusCode::ACCEPTED, Json(item)))
}

/// Object-key-safe version of a user supplied filename.
fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(|c: char| c == '.' || c == '_').is_empty() {
        "resume".to_string()
    } else {
        cleaned
    }
}
