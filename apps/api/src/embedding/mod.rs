//! Embedding Gateway — wraps the embedding provider behind a fixed-dimension contract.
//!
//! A successful call always yields a finite, non-zero vector of the configured
//! dimension. Anything else is an explicit failure: a zero vector would read as
//! "no match" under cosine similarity and silently corrupt ranking.

pub mod client;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::errors::PipelineError;
use crate::models::candidate::CandidateProfile;
use crate::models::job::JobPosting;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("degenerate embedding: {0}")]
    Degenerate(&'static str),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    max_chars: usize,
    timeout: Duration,
}

impl EmbeddingGateway {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        dimensions: usize,
        max_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            dimensions,
            max_chars,
            timeout,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let text = truncate_chars(text.trim(), self.max_chars);
        if text.is_empty() {
            return Err(PipelineError::InputUnavailable(
                "nothing to embed: text is empty".to_string(),
            ));
        }

        let result = match tokio::time::timeout(self.timeout, self.provider.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(self.timeout)),
        };

        result
            .and_then(|vector| self.validate(vector))
            .map_err(|e| {
                warn!("Embedding unavailable: {e}");
                PipelineError::ProviderUnavailable(e.to_string())
            })
    }

    pub async fn embed_job(&self, job: &JobPosting) -> Result<Vec<f32>, PipelineError> {
        self.embed(&job_synopsis(job)).await
    }

    pub async fn embed_candidate(
        &self,
        candidate: &CandidateProfile,
    ) -> Result<Vec<f32>, PipelineError> {
        self.embed(&candidate_synopsis(candidate)).await
    }

    fn validate(&self, vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if vector.len() != self.dimensions {
            return Err(EmbeddingError::Dimension {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::Degenerate("non-finite component"));
        }
        if vector.iter().all(|v| *v == 0.0) {
            return Err(EmbeddingError::Degenerate("zero vector"));
        }
        Ok(vector)
    }
}

/// Job text in a fixed field order so identical field sets embed identically:
/// title, description, requirements, responsibilities, skills, department, level.
pub fn job_synopsis(job: &JobPosting) -> String {
    let skills = job
        .skills_required
        .iter()
        .chain(job.skills_preferred.iter())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let level = job.experience_level.map(|l| format!("Experience level: {l}"));

    join_sections([
        Some(job.title.clone()),
        job.description.clone(),
        job.requirements.clone(),
        job.responsibilities.clone(),
        (!skills.is_empty()).then(|| format!("Skills: {skills}")),
        job.department.as_ref().map(|d| format!("Department: {d}")),
        level,
    ])
}

/// Candidate text built from parsed fields; falls back to the normalized resume
/// text when the profile has not been parsed.
pub fn candidate_synopsis(candidate: &CandidateProfile) -> String {
    let headline = match (
        candidate.current_position.as_deref(),
        candidate.current_company.as_deref(),
    ) {
        (Some(p), Some(c)) => Some(format!("{p} at {c}")),
        (Some(p), None) => Some(p.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    };

    let skills = candidate.skill_names().collect::<Vec<_>>().join(", ");

    let experience = candidate
        .experience
        .iter()
        .map(|e| match e.description.as_deref() {
            Some(d) => format!("{} at {}: {}", e.title, e.company, d),
            None => format!("{} at {}", e.title, e.company),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let education = candidate
        .education
        .iter()
        .map(|e| {
            [e.degree.as_deref(), e.field.as_deref(), Some(e.institution.as_str())]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let synopsis = join_sections([
        candidate.summary.clone(),
        headline,
        (!skills.is_empty()).then(|| format!("Skills: {skills}")),
        (!experience.is_empty()).then_some(experience),
        (!education.is_empty()).then_some(education),
        (!candidate.certifications.is_empty())
            .then(|| format!("Certifications: {}", candidate.certifications.join(", "))),
    ]);

    if synopsis.is_empty() {
        candidate.resume_text.clone().unwrap_or_default()
    } else {
        synopsis
    }
}

fn join_sections<const N: usize>(sections: [Option<String>; N]) -> String {
    sections
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
