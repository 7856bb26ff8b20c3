use serde::{Deserialize, Serialize};

use crate::models::candidate::ContactInfo;
use crate::profile::extractor::StructuredProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Strong,
    Moderate,
    Weak,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionHealth {
    pub section: String,
    pub score: f64,
    pub status: SectionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// 0 – 100
    pub overall_score: f64,
    pub sections: Vec<SectionHealth>,
    pub missing_sections: Vec<String>,
}

const SECTION_WEIGHTS: &[(&str, f64)] = &[
    ("experience", 0.35),
    ("skills", 0.20),
    ("education", 0.15),
    ("contact", 0.15),
    ("summary", 0.10),
    ("certifications", 0.05),
];

/// Scores how complete a parsed profile is. Used as the candidate `quality_score`.
pub fn compute_quality_report(profile: &StructuredProfile, contact: &ContactInfo) -> QualityReport {
    let mut sections = Vec::new();
    let mut missing_sections = Vec::new();
    let mut weighted = 0.0;

    for (section, weight) in SECTION_WEIGHTS {
        let score = section_score(section, profile, contact).clamp(0.0, 1.0);
        if score == 0.0 {
            missing_sections.push(section.to_string());
        }
        weighted += score * weight;
        sections.push(SectionHealth {
            section: section.to_string(),
            score,
            status: status_for(score),
        });
    }

    QualityReport {
        overall_score: (weighted * 100.0).round(),
        sections,
        missing_sections,
    }
}

fn section_score(section: &str, profile: &StructuredProfile, contact: &ContactInfo) -> f64 {
    match section {
        "experience" => {
            let n = profile.experience.len();
            if n == 0 {
                return 0.0;
            }
            let dated = profile
                .experience
                .iter()
                .filter(|e| e.start_date.is_some())
                .count();
            (n as f64 / 3.0).min(1.0) * 0.7 + (dated as f64 / n as f64) * 0.3
        }
        "skills" => (profile.skills.len() as f64 / 8.0).min(1.0),
        "education" => {
            if profile.education.is_empty() {
                0.0
            } else {
                1.0
            }
        }
        "contact" => {
            let present = [
                contact.email.is_some(),
                contact.phone.is_some(),
                contact.linkedin.is_some() || contact.github.is_some(),
            ];
            present.iter().filter(|p| **p).count() as f64 / present.len() as f64
        }
        "summary" => match profile.summary.as_deref().map(str::trim) {
            Some(s) if s.chars().count() >= 80 => 1.0,
            Some(s) if !s.is_empty() => 0.5,
            _ => 0.0,
        },
        "certifications" => {
            if profile.certifications.is_empty() {
                0.0
            } else {
                1.0
            }
        }
        _ => 0.0,
    }
}

fn status_for(score: f64) -> SectionStatus {
    if score >= 0.8 {
        SectionStatus::Strong
    } else if score >= 0.5 {
        SectionStatus::Moderate
    } else if score > 0.0 {
        SectionStatus::Weak
    } else {
        SectionStatus::Missing
    }
}
