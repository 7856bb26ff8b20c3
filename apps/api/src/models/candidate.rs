use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// One position on a resume. Dates are opaque, date-like strings as extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub proficiency: Option<String>,
}

impl Skill {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proficiency: None,
        }
    }
}

/// Contact details pulled from resume text. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub open_to_remote: bool,
    pub summary: Option<String>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub skills: Vec<Skill>,
    pub certifications: Vec<String>,
    pub current_position: Option<String>,
    pub current_company: Option<String>,
    pub total_experience_years: Option<i32>,
    pub resume_text: Option<String>,
    pub resume_generation: i64,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_generation: Option<i64>,
    pub quality_score: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl CandidateProfile {
    pub fn skill_names(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().map(|s| s.name.as_str())
    }

    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(n), None) | (None, Some(n)) => n.to_string(),
            (None, None) => format!("Candidate {}", self.id),
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub open_to_remote: bool,
    pub summary: Option<String>,
    pub experience: Json<Vec<Experience>>,
    pub education: Json<Vec<Education>>,
    pub skills: Json<Vec<Skill>>,
    pub certifications: Vec<String>,
    pub current_position: Option<String>,
    pub current_company: Option<String>,
    pub total_experience_years: Option<i32>,
    pub resume_text: Option<String>,
    pub resume_generation: i64,
    pub embedding: Option<Vec<f32>>,
    pub embedding_generation: Option<i64>,
    pub quality_score: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl From<CandidateRow> for CandidateProfile {
    fn from(row: CandidateRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            location: row.location,
            linkedin_url: row.linkedin_url,
            github_url: row.github_url,
            open_to_remote: row.open_to_remote,
            summary: row.summary,
            experience: row.experience.0,
            education: row.education.0,
            skills: row.skills.0,
            certifications: row.certifications,
            current_position: row.current_position,
            current_company: row.current_company,
            total_experience_years: row.total_experience_years,
            resume_text: row.resume_text,
            resume_generation: row.resume_generation,
            embedding: row.embedding,
            embedding_generation: row.embedding_generation,
            quality_score: row.quality_score,
            created_at: row.created_at,
        }
    }
}
