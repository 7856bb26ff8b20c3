use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    EmbedJob,
    EmbedCandidate,
    ParseResume,
    ScreenApplication,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::EmbedJob => "embed_job",
            WorkKind::EmbedCandidate => "embed_candidate",
            WorkKind::ParseResume => "parse_resume",
            WorkKind::ScreenApplication => "screen_application",
        }
    }

    /// Screening is rejected while another run is queued or in flight; the
    /// other kinds coalesce and rely on generation checks instead.
    pub fn rejects_duplicates(&self) -> bool {
        matches!(self, WorkKind::ScreenApplication)
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embed_job" => Ok(WorkKind::EmbedJob),
            "embed_candidate" => Ok(WorkKind::EmbedCandidate),
            "parse_resume" => Ok(WorkKind::ParseResume),
            "screen_application" => Ok(WorkKind::ScreenApplication),
            other => Err(format!("unknown work kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkStatus::Pending),
            "running" => Ok(WorkStatus::Running),
            "succeeded" => Ok(WorkStatus::Succeeded),
            "failed" => Ok(WorkStatus::Failed),
            other => Err(format!("unknown work status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: WorkKind,
    pub target_id: Uuid,
    /// Entity generation the work was enqueued for. Writes from older
    /// generations are discarded by the executor.
    pub generation: i64,
    pub status: WorkStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewWorkItem {
    pub tenant_id: Uuid,
    pub kind: WorkKind,
    pub target_id: Uuid,
    pub generation: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct WorkItemRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: String,
    pub target_id: Uuid,
    pub generation: i64,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = String;

    fn try_from(row: WorkItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            kind: row.kind.parse()?,
            target_id: row.target_id,
            generation: row.generation,
            status: row.status.parse()?,
            attempts: row.attempts,
            last_error: row.last_error,
            worker_id: row.worker_id,
            lease_expires_at: row.lease_expires_at,
            run_after: row.run_after,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
