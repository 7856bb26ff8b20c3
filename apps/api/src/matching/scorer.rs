//! Match Scorer — ranks a candidate pool against a job.
//!
//! fit = w_sim·similarity + w_skills·skills_overlap + w_exp·experience_fit + w_loc·location_fit
//!
//! Pure and deterministic: no I/O, no randomness. The explanation is rendered from
//! the same breakdown that produced the score, so the two can never disagree.

use std::collections::HashSet;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::candidate::CandidateProfile;
use crate::models::job::{ExperienceLevel, JobPosting};

/// Years outside a band after which experience_fit reaches zero.
const EXPERIENCE_DECAY_YEARS: f64 = 4.0;
/// Credit given when location compatibility cannot be established.
const UNKNOWN_LOCATION_FIT: f64 = 0.3;
/// Credit given when the candidate's total experience is unknown.
const UNKNOWN_EXPERIENCE_FIT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub similarity: f64,
    pub skills: f64,
    pub experience: f64,
    pub location: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            similarity: 0.40,
            skills: 0.30,
            experience: 0.20,
            location: 0.10,
        }
    }
}

impl MatchWeights {
    /// Weights must be finite, non-negative and sum to 1.
    pub fn validate(&self) -> Result<()> {
        let all = [self.similarity, self.skills, self.experience, self.location];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            bail!("match weights must be finite and non-negative: {self:?}");
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            bail!("match weights must sum to 1.0, got {sum}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub weights: MatchWeights,
    /// Minimum structured-only score for a candidate without an embedding to be
    /// surfaced against a job that has one. `None` excludes such candidates.
    pub structured_floor: Option<f64>,
    pub default_limit: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            weights: MatchWeights::default(),
            structured_floor: Some(0.5),
            default_limit: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationReason {
    Remote,
    LocationMatch,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub similarity: f64,
    /// False when either side had no embedding and similarity defaulted to 0.
    pub similarity_available: bool,
    pub skills_overlap: f64,
    pub experience_fit: f64,
    pub location_fit: f64,
    pub matched_required: Vec<String>,
    pub missing_required: Vec<String>,
    pub matched_preferred: Vec<String>,
    pub preferred_total: usize,
    pub candidate_years: Option<i32>,
    pub experience_level: Option<ExperienceLevel>,
    pub location_reason: LocationReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    /// 0.0 – 1.0
    pub fit_score: f64,
    pub breakdown: SignalBreakdown,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillsOverlap {
    pub score: f64,
    pub matched_required: Vec<String>,
    pub missing_required: Vec<String>,
    pub matched_preferred: Vec<String>,
    pub preferred_total: usize,
}

pub struct MatchScorer {
    config: MatchConfig,
}

impl MatchScorer {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Scores one pair unconditionally. Missing embeddings give similarity 0.
    pub fn score_pair(&self, job: &JobPosting, candidate: &CandidateProfile) -> MatchResult {
        let (similarity, similarity_available) = match (&job.embedding, &candidate.embedding) {
            (Some(j), Some(c)) if !j.is_empty() && !c.is_empty() => (cosine_similarity(j, c), true),
            _ => (0.0, false),
        };

        let skills = skills_overlap(
            &job.skills_required,
            &job.skills_preferred,
            candidate.skill_names(),
        );
        let experience_fit = experience_fit(job.experience_level, candidate.total_experience_years);
        let (location_fit, location_reason) = location_fit(job, candidate);

        let w = &self.config.weights;
        let fit_score = (w.similarity * similarity
            + w.skills * skills.score
            + w.experience * experience_fit
            + w.location * location_fit)
            .clamp(0.0, 1.0);

        let breakdown = SignalBreakdown {
            similarity,
            similarity_available,
            skills_overlap: skills.score,
            experience_fit,
            location_fit,
            matched_required: skills.matched_required,
            missing_required: skills.missing_required,
            matched_preferred: skills.matched_preferred,
            preferred_total: skills.preferred_total,
            candidate_years: candidate.total_experience_years,
            experience_level: job.experience_level,
            location_reason,
        };
        let explanation = explain(&breakdown);

        MatchResult {
            candidate_id: candidate.id,
            job_id: job.id,
            fit_score,
            breakdown,
            explanation,
        }
    }

    /// Scores the whole pool, sorts, then truncates to `limit`.
    ///
    /// Order: fit_score desc, skills_overlap desc, candidate created_at asc, id asc.
    pub fn rank(
        &self,
        job: &JobPosting,
        pool: &[CandidateProfile],
        limit: usize,
    ) -> Vec<MatchResult> {
        let job_has_embedding = job.has_embedding();

        let mut scored: Vec<(MatchResult, DateTime<Utc>)> = pool
            .iter()
            .filter_map(|candidate| {
                let result = self.score_pair(job, candidate);
                if job_has_embedding && !candidate.has_embedding() {
                    let floor = self.config.structured_floor?;
                    if self.structured_score(&result.breakdown) < floor {
                        return None;
                    }
                }
                Some((result, candidate.created_at))
            })
            .collect();

        scored.sort_by(|(a, a_created), (b, b_created)| {
            b.fit_score
                .total_cmp(&a.fit_score)
                .then_with(|| b.breakdown.skills_overlap.total_cmp(&a.breakdown.skills_overlap))
                .then_with(|| a_created.cmp(b_created))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });

        scored.truncate(limit);
        scored.into_iter().map(|(result, _)| result).collect()
    }

    /// Weighted mean of the structured signals only (similarity excluded).
    pub fn structured_score(&self, breakdown: &SignalBreakdown) -> f64 {
        let w = &self.config.weights;
        let denominator = w.skills + w.experience + w.location;
        if denominator <= 0.0 {
            return 0.0;
        }
        (w.skills * breakdown.skills_overlap
            + w.experience * breakdown.experience_fit
            + w.location * breakdown.location_fit)
            / denominator
    }
}

/// Cosine similarity clamped into [0, 1]. Negative similarity is "no signal".
/// Mismatched dimensions, zero norms and non-finite results give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    if cosine.is_finite() {
        cosine.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// (2·|required ∩ candidate| + |preferred ∩ candidate|) / (2·|required| + |preferred|)
///
/// Case-insensitive exact matching only. Duplicates collapse; a skill listed as
/// both required and preferred counts as required. A job listing no skills scores 1.0.
pub fn skills_overlap<'a>(
    required: &[String],
    preferred: &[String],
    candidate_skills: impl IntoIterator<Item = &'a str>,
) -> SkillsOverlap {
    let have: HashSet<String> = candidate_skills
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let required: Vec<&str> = dedup_skills(required, &mut seen);
    let preferred: Vec<&str> = dedup_skills(preferred, &mut seen);

    let (matched_required, missing_required): (Vec<&str>, Vec<&str>) = required
        .iter()
        .partition(|s| have.contains(&s.to_lowercase()));
    let matched_preferred: Vec<&str> = preferred
        .iter()
        .copied()
        .filter(|s| have.contains(&s.to_lowercase()))
        .collect();

    let denominator = (required.len() * 2 + preferred.len()) as f64;
    let score = if denominator == 0.0 {
        1.0
    } else {
        (matched_required.len() * 2 + matched_preferred.len()) as f64 / denominator
    };

    SkillsOverlap {
        score,
        matched_required: matched_required.into_iter().map(String::from).collect(),
        missing_required: missing_required.into_iter().map(String::from).collect(),
        matched_preferred: matched_preferred.into_iter().map(String::from).collect(),
        preferred_total: preferred.len(),
    }
}

fn dedup_skills<'a>(skills: &'a [String], seen: &mut HashSet<String>) -> Vec<&'a str> {
    skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

/// Advisory year bands per level. Bands overlap; open-ended bands have no upper edge.
pub fn experience_band(level: ExperienceLevel) -> (f64, Option<f64>) {
    match level {
        ExperienceLevel::Entry => (0.0, Some(2.0)),
        ExperienceLevel::Junior => (1.0, Some(4.0)),
        ExperienceLevel::Mid => (3.0, Some(7.0)),
        ExperienceLevel::Senior => (6.0, Some(12.0)),
        ExperienceLevel::Lead => (10.0, None),
        ExperienceLevel::Principal => (12.0, None),
    }
}

pub fn experience_fit(level: Option<ExperienceLevel>, years: Option<i32>) -> f64 {
    let Some(level) = level else {
        return 1.0;
    };
    let Some(years) = years else {
        return UNKNOWN_EXPERIENCE_FIT;
    };

    let years = years as f64;
    let (low, high) = experience_band(level);
    let distance = if years < low {
        low - years
    } else {
        match high {
            Some(high) if years > high => years - high,
            _ => 0.0,
        }
    };

    (1.0 - distance / EXPERIENCE_DECAY_YEARS).max(0.0)
}

pub fn location_fit(job: &JobPosting, candidate: &CandidateProfile) -> (f64, LocationReason) {
    if job.is_remote || candidate.open_to_remote {
        return (1.0, LocationReason::Remote);
    }

    let normalize = |s: &Option<String>| {
        s.as_deref()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
    };

    match (normalize(&job.location), normalize(&candidate.location)) {
        (Some(job_loc), Some(cand_loc))
            if cand_loc.contains(&job_loc) || job_loc.contains(&cand_loc) =>
        {
            (1.0, LocationReason::LocationMatch)
        }
        _ => (UNKNOWN_LOCATION_FIT, LocationReason::Unknown),
    }
}

/// Renders the breakdown as a human-readable sentence list.
pub fn explain(b: &SignalBreakdown) -> String {
    let mut parts = Vec::new();

    let required_total = b.matched_required.len() + b.missing_required.len();
    if required_total == 0 && b.preferred_total == 0 {
        parts.push("Skills: the job lists no skills.".to_string());
    } else {
        let mut skills = format!(
            "Skills: matched {} of {} required",
            b.matched_required.len(),
            required_total
        );
        if !b.matched_required.is_empty() {
            skills.push_str(&format!(" ({})", b.matched_required.join(", ")));
        }
        if !b.missing_required.is_empty() {
            skills.push_str(&format!("; missing {}", b.missing_required.join(", ")));
        }
        skills.push_str(&format!(
            "; matched {} of {} preferred.",
            b.matched_preferred.len(),
            b.preferred_total
        ));
        parts.push(skills);
    }

    parts.push(match (b.experience_level, b.candidate_years) {
        (None, _) => "Experience: no level requirement.".to_string(),
        (Some(level), None) => format!("Experience: not stated ({level} role)."),
        (Some(level), Some(years)) => {
            let (low, high) = experience_band(level);
            let band = match high {
                Some(high) => format!("{low:.0}–{high:.0} years"),
                None => format!("{low:.0}+ years"),
            };
            let position = if (years as f64) < low {
                "is below"
            } else if high.is_some_and(|h| years as f64 > h) {
                "is above"
            } else {
                "fits"
            };
            format!("Experience: {years} years {position} the {level} band ({band}).")
        }
    });

    parts.push(
        match b.location_reason {
            LocationReason::Remote => "Location: remote-compatible.",
            LocationReason::LocationMatch => "Location: matches the job location.",
            LocationReason::Unknown => "Location: compatibility unknown, partial credit.",
        }
        .to_string(),
    );

    parts.push(if b.similarity_available {
        format!("Semantic similarity: {:.2}.", b.similarity)
    } else {
        "Semantic similarity: unavailable (missing embedding).".to_string()
    });

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, job};
    use chrono::Duration;

    fn scorer() -> MatchScorer {
        MatchScorer::new(MatchConfig::default())
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // Scenario A
    #[test]
    fn test_required_skill_half_match() {
        let overlap = skills_overlap(&strings(&["Python", "SQL"]), &[], ["Python"]);
        assert_eq!(overlap.score, 0.5);
        assert_eq!(overlap.matched_required, vec!["Python"]);
        assert_eq!(overlap.missing_required, vec!["SQL"]);
    }

    #[test]
    fn test_skills_match_is_case_insensitive_exact() {
        let overlap = skills_overlap(
            &strings(&["PostgreSQL"]),
            &strings(&["Kubernetes"]),
            ["postgresql", "k8s"],
        );
        // (1*2 + 0) / (1*2 + 1)
        assert!((overlap.score - 2.0 / 3.0).abs() < 1e-12);
        assert!(overlap.matched_preferred.is_empty());
    }

    #[test]
    fn test_duplicate_and_cross_listed_skills_collapse() {
        let overlap = skills_overlap(
            &strings(&["Rust", "rust"]),
            &strings(&["RUST", "Go"]),
            ["Rust"],
        );
        // required = [Rust], preferred = [Go] → (2 + 0) / (2 + 1)
        assert_eq!(overlap.preferred_total, 1);
        assert!((overlap.score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_job_without_skills_scores_full_overlap() {
        assert_eq!(skills_overlap(&[], &[], ["Rust"]).score, 1.0);
    }

    // Scenario B
    #[test]
    fn test_senior_band_fit() {
        assert_eq!(experience_fit(Some(ExperienceLevel::Senior), Some(9)), 1.0);
    }

    #[test]
    fn test_experience_decays_linearly_outside_band() {
        // senior 6–12: 4 years is 2 below → 1 - 2/4
        assert_eq!(experience_fit(Some(ExperienceLevel::Senior), Some(4)), 0.5);
        // 14 years is 2 above → 0.5
        assert_eq!(experience_fit(Some(ExperienceLevel::Senior), Some(14)), 0.5);
        // far outside floors at zero
        assert_eq!(experience_fit(Some(ExperienceLevel::Senior), Some(30)), 0.0);
        // open-ended principal band
        assert_eq!(experience_fit(Some(ExperienceLevel::Principal), Some(40)), 1.0);
    }

    #[test]
    fn test_experience_degenerate_inputs() {
        assert_eq!(experience_fit(None, None), 1.0);
        assert_eq!(experience_fit(Some(ExperienceLevel::Mid), None), 0.5);
    }

    // Scenario C
    #[test]
    fn test_location_substring_match() {
        let mut j = job(vec![], vec![]);
        j.is_remote = false;
        j.location = Some("Austin".to_string());
        let mut c = candidate(vec![], None);
        c.location = Some("Austin, TX".to_string());
        c.open_to_remote = false;

        assert_eq!(location_fit(&j, &c), (1.0, LocationReason::LocationMatch));
    }

    #[test]
    fn test_location_partial_credit_and_remote() {
        let mut j = job(vec![], vec![]);
        j.location = Some("Berlin".to_string());
        let mut c = candidate(vec![], None);
        c.location = Some("Austin, TX".to_string());
        assert_eq!(location_fit(&j, &c), (0.3, LocationReason::Unknown));

        c.location = None;
        assert_eq!(location_fit(&j, &c).0, 0.3);

        c.open_to_remote = true;
        assert_eq!(location_fit(&j, &c), (1.0, LocationReason::Remote));
    }

    #[test]
    fn test_negative_cosine_clamps_to_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[1.0, 1.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_anti_correlated_pair_contributes_nothing() {
        let mut j = job(vec![], vec![]);
        j.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut c = candidate(vec![], None);
        c.embedding = Some(vec![-1.0, 0.0, 0.0]);

        let result = scorer().score_pair(&j, &c);
        assert_eq!(result.breakdown.similarity, 0.0);
        assert!(result.breakdown.similarity_available);
        assert!(result.fit_score >= 0.0);
    }

    #[test]
    fn test_fusion_weights() {
        let mut j = job(vec!["Python", "SQL"], vec![]);
        j.embedding = Some(vec![1.0, 0.0]);
        j.experience_level = Some(ExperienceLevel::Senior);
        j.location = Some("Austin".to_string());
        let mut c = candidate(vec!["Python"], Some(9));
        c.embedding = Some(vec![1.0, 0.0]);
        c.location = Some("Austin, TX".to_string());

        let result = scorer().score_pair(&j, &c);
        // 0.4*1 + 0.3*0.5 + 0.2*1 + 0.1*1
        assert!((result.fit_score - 0.85).abs() < 1e-9, "{}", result.fit_score);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let mut j = job(vec!["Rust"], vec!["Go"]);
        j.embedding = Some(vec![0.3, 0.4, 0.5]);
        let mut c = candidate(vec!["Rust", "Go"], Some(5));
        c.embedding = Some(vec![0.5, 0.4, 0.3]);

        let a = scorer().score_pair(&j, &c);
        let b = scorer().score_pair(&j, &c);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ties_break_on_skills_then_creation_time() {
        let j = job(vec!["Rust"], vec![]);
        let now = Utc::now();

        let mut a = candidate(vec!["Rust"], None);
        a.created_at = now;
        let mut b = candidate(vec!["Rust"], None);
        b.created_at = now - Duration::days(1);
        let mut c = candidate(vec![], None);
        c.created_at = now - Duration::days(2);

        let ranked = scorer().rank(&j, &[a.clone(), b.clone(), c.clone()], 10);
        let ids: Vec<Uuid> = ranked.iter().map(|r| r.candidate_id).collect();
        assert_eq!(ids, vec![b.id, a.id, c.id]);
    }

    #[test]
    fn test_equal_fit_prefers_higher_skills_overlap() {
        // Same fit score reached through different signals.
        let weights = MatchWeights {
            similarity: 0.5,
            skills: 0.5,
            experience: 0.0,
            location: 0.0,
        };
        let s = MatchScorer::new(MatchConfig {
            weights,
            structured_floor: None,
            default_limit: 10,
        });
        let mut j = job(vec!["Rust"], vec![]);
        j.embedding = Some(vec![1.0, 0.0]);

        let mut low_skills = candidate(vec![], None);
        low_skills.embedding = Some(vec![1.0, 0.0]); // sim 1, skills 0
        low_skills.created_at = Utc::now() - Duration::days(10);
        let mut high_skills = candidate(vec!["Rust"], None);
        high_skills.embedding = Some(vec![0.0, 1.0]); // sim 0, skills 1

        let ranked = s.rank(&j, &[low_skills.clone(), high_skills.clone()], 10);
        assert_eq!(ranked[0].fit_score, ranked[1].fit_score);
        assert_eq!(ranked[0].candidate_id, high_skills.id);
    }

    #[test]
    fn test_truncation_happens_after_full_sort() {
        let j = job(vec!["Rust"], vec![]);
        let pool: Vec<CandidateProfile> = (0..5)
            .map(|i| {
                if i == 4 {
                    candidate(vec!["Rust"], None)
                } else {
                    candidate(vec![], None)
                }
            })
            .collect();

        let ranked = scorer().rank(&j, &pool, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate_id, pool[4].id);
    }

    #[test]
    fn test_missing_candidate_embedding_uses_structured_floor() {
        let mut j = job(vec!["Rust"], vec![]);
        j.embedding = Some(vec![1.0, 0.0]);
        j.is_remote = true;

        // structured = 1.0
        let strong = candidate(vec!["Rust"], None);
        // structured = (0.3*0 + 0.2*1 + 0.1*1) / 0.6 = 0.5
        let weak = candidate(vec![], None);
        let below = candidate(vec!["Go"], None);
        let floor_scorer = MatchScorer::new(MatchConfig {
            structured_floor: Some(0.6),
            ..MatchConfig::default()
        });

        let ranked = floor_scorer.rank(&j, &[strong.clone(), weak, below], 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate_id, strong.id);
        assert!(!ranked[0].breakdown.similarity_available);

        let excluding = MatchScorer::new(MatchConfig {
            structured_floor: None,
            ..MatchConfig::default()
        });
        assert!(excluding.rank(&j, &[strong], 10).is_empty());
    }

    // Scenario D
    #[test]
    fn test_job_without_embedding_scores_everyone_with_zero_similarity() {
        let j = job(vec!["Python"], vec![]);
        assert!(j.embedding.is_none());

        let mut with_embedding = candidate(vec!["Python"], None);
        with_embedding.embedding = Some(vec![0.1, 0.2]);
        let without = candidate(vec![], None);

        let ranked = MatchScorer::new(MatchConfig {
            structured_floor: None,
            ..MatchConfig::default()
        })
        .rank(&j, &[with_embedding, without], 10);

        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.breakdown.similarity == 0.0));
    }

    #[test]
    fn test_explanation_is_derived_from_breakdown() {
        let mut j = job(vec!["Python", "SQL"], vec!["Airflow"]);
        j.experience_level = Some(ExperienceLevel::Senior);
        j.location = Some("Austin".to_string());
        let mut c = candidate(vec!["python"], Some(9));
        c.location = Some("Austin, TX".to_string());

        let result = scorer().score_pair(&j, &c);
        assert_eq!(result.explanation, explain(&result.breakdown));
        assert_eq!(
            result.explanation,
            "Skills: matched 1 of 2 required (Python); missing SQL; matched 0 of 1 preferred. \
             Experience: 9 years fits the senior band (6–12 years). \
             Location: matches the job location. \
             Semantic similarity: unavailable (missing embedding)."
        );
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(MatchWeights::default().validate().is_ok());
        let bad = MatchWeights {
            similarity: 0.9,
            ..MatchWeights::default()
        };
        assert!(bad.validate().is_err());
    }
}
