//! Profile Extractor — turns normalized resume text into a structured profile via the LLM.
//!
//! The LLM must return one well-formed object matching `StructuredProfile`. Anything
//! else fails the whole extraction; no field of a malformed response is trusted.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::llm_client::LanguageModel;
use crate::models::candidate::{ContactInfo, Education, Experience};
use crate::profile::normalizer::NormalizedResume;
use crate::profile::quality::compute_quality_report;

/// Contact block as the LLM reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
}

/// The exact shape the extraction call must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredProfile {
    pub contact: ExtractedContact,
    #[serde(default)]
    pub summary: Option<String>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub skills: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default, deserialize_with = "whole_years")]
    pub total_experience_years: Option<i32>,
}

/// Everything the parse worker writes back onto the candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedProfile {
    pub resume_text: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub location: Option<String>,
    pub contact: ContactInfo,
    pub profile: StructuredProfile,
    pub current_position: Option<String>,
    pub current_company: Option<String>,
    pub quality_score: f32,
}

pub struct ProfileExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl ProfileExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn extract(&self, normalized: &NormalizedResume) -> Result<ParsedProfile, PipelineError> {
        let text = normalized
            .text
            .as_deref()
            .ok_or_else(|| PipelineError::InputUnavailable("resume text is empty".to_string()))?;

        let raw = self
            .llm
            .extract_profile(text)
            .await
            .map_err(|e| PipelineError::ProviderUnavailable(format!("profile extraction failed: {e}")))?;

        let profile = sanitize(raw);
        if is_empty_profile(&profile) {
            return Err(PipelineError::InputUnavailable(
                "no profile content could be extracted".to_string(),
            ));
        }

        let contact = merge_contact(&normalized.contact, &profile.contact);
        let (first_name, last_name) = split_name(profile.contact.name.as_deref());
        let (current_position, current_company) = match derive_current_role(&profile.experience) {
            Some(e) => (non_empty(&e.title), non_empty(&e.company)),
            None => (None, None),
        };
        let quality = compute_quality_report(&profile, &contact);

        debug!(
            "Extracted profile: {} experience, {} education, {} skills, quality {}",
            profile.experience.len(),
            profile.education.len(),
            profile.skills.len(),
            quality.overall_score
        );
        info!("Profile extraction succeeded");

        Ok(ParsedProfile {
            resume_text: text.to_string(),
            first_name,
            last_name,
            location: profile.contact.location.clone(),
            contact,
            current_position,
            current_company,
            quality_score: quality.overall_score as f32,
            profile,
        })
    }
}

/// Picks the entry describing the candidate's current role.
///
/// The entry flagged `is_current` wins. Otherwise the entry with the greatest
/// `end_date` wins, compared as plain strings: dates are not guaranteed to be
/// in a calendar format, so "2021-03" vs "Mar 2022" compares lexically.
/// Ties keep the entry listed first.
pub fn derive_current_role(experience: &[Experience]) -> Option<&Experience> {
    if let Some(current) = experience.iter().find(|e| e.is_current) {
        return Some(current);
    }

    experience
        .iter()
        .filter(|e| e.end_date.is_some())
        .fold(None, |best: Option<&Experience>, e| match best {
            Some(b) if b.end_date >= e.end_date => Some(b),
            _ => Some(e),
        })
}

/// Regex-extracted fields are structurally reliable, so they take precedence;
/// the LLM fills whatever the patterns missed.
fn merge_contact(regex: &ContactInfo, llm: &ExtractedContact) -> ContactInfo {
    ContactInfo {
        email: regex.email.clone().or_else(|| llm.email.clone()),
        phone: regex.phone.clone().or_else(|| llm.phone.clone()),
        linkedin: regex.linkedin.clone().or_else(|| llm.linkedin.clone()),
        github: regex.github.clone().or_else(|| llm.github.clone()),
    }
}

fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (Some(first.to_string()), non_empty(rest)),
        None => (Some(name.to_string()), None),
    }
}

fn sanitize(mut profile: StructuredProfile) -> StructuredProfile {
    for e in &mut profile.experience {
        e.company = e.company.trim().to_string();
        e.title = e.title.trim().to_string();
        e.start_date = e.start_date.take().and_then(|d| non_empty(&d));
        e.end_date = e.end_date.take().and_then(|d| non_empty(&d));
    }
    profile
        .experience
        .retain(|e| !e.company.is_empty() || !e.title.is_empty());
    profile.education.retain(|e| !e.institution.trim().is_empty());

    let mut seen = std::collections::HashSet::new();
    profile.skills = profile
        .skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect();
    profile.summary = profile.summary.and_then(|s| non_empty(&s));
    profile.total_experience_years = profile.total_experience_years.filter(|y| *y >= 0);
    profile
}

fn is_empty_profile(profile: &StructuredProfile) -> bool {
    profile.summary.is_none()
        && profile.experience.is_empty()
        && profile.education.is_empty()
        && profile.skills.is_empty()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Accepts integer or fractional years, rounding fractions down.
fn whole_years<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite()).map(|v| v.floor() as i32))
}
