use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Seniority ladder. Ordering matters: entry < junior < mid < senior < lead < principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Entry,
    Junior,
    Mid,
    Senior,
    Lead,
    Principal,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Entry => "entry",
            ExperienceLevel::Junior => "junior",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Lead => "lead",
            ExperienceLevel::Principal => "principal",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(ExperienceLevel::Entry),
            "junior" => Ok(ExperienceLevel::Junior),
            "mid" => Ok(ExperienceLevel::Mid),
            "senior" => Ok(ExperienceLevel::Senior),
            "lead" => Ok(ExperienceLevel::Lead),
            "principal" => Ok(ExperienceLevel::Principal),
            other => Err(format!("unknown experience level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub responsibilities: Option<String>,
    pub department: Option<String>,
    pub skills_required: Vec<String>,
    pub skills_preferred: Vec<String>,
    pub experience_level: Option<ExperienceLevel>,
    pub location: Option<String>,
    pub is_remote: bool,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub content_generation: i64,
    pub created_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// True when an edit touched any field the job embedding is built from.
/// CRUD callers use this to decide whether to invalidate the embedding.
pub fn job_content_changed(old: &JobPosting, new: &JobPosting) -> bool {
    old.title != new.title
        || old.description != new.description
        || old.requirements != new.requirements
        || old.responsibilities != new.responsibilities
        || old.department != new.department
        || old.skills_required != new.skills_required
        || old.skills_preferred != new.skills_preferred
        || old.experience_level != new.experience_level
}

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub responsibilities: Option<String>,
    pub department: Option<String>,
    pub skills_required: Vec<String>,
    pub skills_preferred: Vec<String>,
    pub experience_level: Option<String>,
    pub location: Option<String>,
    pub is_remote: bool,
    pub embedding: Option<Vec<f32>>,
    pub content_generation: i64,
    pub created_at: DateTime<Utc>,
}

impl From<JobRow> for JobPosting {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            title: row.title,
            description: row.description,
            requirements: row.requirements,
            responsibilities: row.responsibilities,
            department: row.department,
            skills_required: row.skills_required,
            skills_preferred: row.skills_preferred,
            experience_level: row
                .experience_level
                .as_deref()
                .and_then(|s| s.parse().ok()),
            location: row.location,
            is_remote: row.is_remote,
            embedding: row.embedding,
            content_generation: row.content_generation,
            created_at: row.created_at,
        }
    }
}
