use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongFit,
    Maybe,
    NotFit,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::StrongFit => "strong_fit",
            Recommendation::Maybe => "maybe",
            Recommendation::NotFit => "not_fit",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strong_fit" => Ok(Recommendation::StrongFit),
            "maybe" => Ok(Recommendation::Maybe),
            "not_fit" => Ok(Recommendation::NotFit),
            other => Err(format!("unknown recommendation '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Unscreened,
    ScreeningInProgress,
    Screened,
    ScreeningFailed,
}

impl FromStr for ScreeningStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unscreened" => Ok(ScreeningStatus::Unscreened),
            "screening_in_progress" => Ok(ScreeningStatus::ScreeningInProgress),
            "screened" => Ok(ScreeningStatus::Screened),
            "screening_failed" => Ok(ScreeningStatus::ScreeningFailed),
            other => Err(format!("unknown screening status '{other}'")),
        }
    }
}

/// The AI-owned slice of an application. Written only by the screening orchestrator,
/// always as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationAssessment {
    pub ai_match_score: Option<i16>,
    pub ai_strengths: Vec<String>,
    pub ai_concerns: Vec<String>,
    pub ai_recommendation: Option<Recommendation>,
    pub ai_summary: Option<String>,
    pub screened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub assessment: ApplicationAssessment,
    pub screening_status: ScreeningStatus,
    pub screening_started_at: Option<DateTime<Utc>>,
    pub last_screening_error: Option<String>,
    pub last_screening_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub ai_match_score: Option<i16>,
    pub ai_strengths: Vec<String>,
    pub ai_concerns: Vec<String>,
    pub ai_recommendation: Option<String>,
    pub ai_summary: Option<String>,
    pub screened_at: Option<DateTime<Utc>>,
    pub screening_status: String,
    pub screening_started_at: Option<DateTime<Utc>>,
    pub last_screening_error: Option<String>,
    pub last_screening_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            job_id: row.job_id,
            candidate_id: row.candidate_id,
            assessment: ApplicationAssessment {
                ai_match_score: row.ai_match_score,
                ai_strengths: row.ai_strengths,
                ai_concerns: row.ai_concerns,
                ai_recommendation: row
                    .ai_recommendation
                    .as_deref()
                    .and_then(|s| s.parse().ok()),
                ai_summary: row.ai_summary,
                screened_at: row.screened_at,
            },
            screening_status: row
                .screening_status
                .parse()
                .unwrap_or(ScreeningStatus::Unscreened),
            screening_started_at: row.screening_started_at,
            last_screening_error: row.last_screening_error,
            last_screening_failed_at: row.last_screening_failed_at,
            created_at: row.created_at,
        }
    }
}
