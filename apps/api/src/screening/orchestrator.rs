//! Screening Orchestrator — one AI fit assessment for one application.
//!
//! unscreened → screening_in_progress → screened | screening_failed
//!
//! The assessment fields come from one model call and are always written together.
//! A failed run records the failure separately and leaves the previous assessment
//! visible. Every successful run appends an immutable activity snapshot.
//!
//! Each run holds the token handed out by `begin_screening`. Once a stale run is
//! taken over, its late writes are rejected and it records no activity.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::embedding::job_synopsis;
use crate::errors::PipelineError;
use crate::llm_client::{FitAssessment, LanguageModel};
use crate::matching::scorer::{MatchResult, MatchScorer};
use crate::models::activity::{NewActivity, AI_SCREENING_COMPLETED};
use crate::models::application::{Application, ApplicationAssessment, Recommendation};
use crate::models::candidate::CandidateProfile;
use crate::models::job::JobPosting;
use crate::store::{ActivitySink, Store};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningOutcome {
    pub application_id: Uuid,
    pub assessment: ApplicationAssessment,
    pub match_result: MatchResult,
}

pub struct ScreeningOrchestrator {
    store: Arc<dyn Store>,
    activities: Arc<dyn ActivitySink>,
    llm: Arc<dyn LanguageModel>,
    scorer: Arc<MatchScorer>,
    stale_after: Duration,
}

impl ScreeningOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        activities: Arc<dyn ActivitySink>,
        llm: Arc<dyn LanguageModel>,
        scorer: Arc<MatchScorer>,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            activities,
            llm,
            scorer,
            stale_after,
        }
    }

    #[instrument(skip(self))]
    pub async fn screen(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<ScreeningOutcome, PipelineError> {
        let application = self
            .store
            .get_application(tenant_id, application_id)
            .await?
            .ok_or_else(|| {
                PipelineError::DataInconsistency(format!("application {application_id} not found"))
            })?;

        let stale_before = Utc::now()
            - chrono::Duration::from_std(self.stale_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let run_id = self
            .store
            .begin_screening(tenant_id, application_id, stale_before)
            .await?;

        match self.run(&application, run_id).await {
            Ok(outcome) => {
                info!(
                    "Screened application {application_id}: score {:?}, recommendation {:?}",
                    outcome.assessment.ai_match_score, outcome.assessment.ai_recommendation
                );
                Ok(outcome)
            }
            Err(e @ PipelineError::ConcurrencyConflict(_)) => {
                warn!("Screening run {run_id} for application {application_id} discarded: {e}");
                Err(e)
            }
            Err(e) => {
                warn!("Screening failed for application {application_id}: {e}");
                match self
                    .store
                    .fail_screening(tenant_id, application_id, run_id, &e.to_string())
                    .await
                {
                    Ok(()) => {}
                    Err(PipelineError::ConcurrencyConflict(_)) => {
                        warn!("Screening run {run_id} superseded; failure not recorded")
                    }
                    Err(mark) => {
                        error!("Could not record screening failure for {application_id}: {mark}")
                    }
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        application: &Application,
        run_id: Uuid,
    ) -> Result<ScreeningOutcome, PipelineError> {
        let tenant_id = application.tenant_id;

        let job = self
            .store
            .get_job(tenant_id, application.job_id)
            .await?
            .ok_or_else(|| {
                PipelineError::DataInconsistency(format!(
                    "job {} for application {} no longer exists",
                    application.job_id, application.id
                ))
            })?;
        let candidate = self
            .store
            .get_candidate(tenant_id, application.candidate_id)
            .await?
            .ok_or_else(|| {
                PipelineError::DataInconsistency(format!(
                    "candidate {} for application {} no longer exists",
                    application.candidate_id, application.id
                ))
            })?;

        let match_result = self.scorer.score_pair(&job, &candidate);

        let fit = self
            .llm
            .score_fit(&job_context(&job), &candidate_context(&candidate, &match_result))
            .await
            .map_err(|e| PipelineError::ProviderUnavailable(format!("fit assessment failed: {e}")))?;

        let assessment = validate_assessment(fit)?;

        self.store
            .complete_screening(tenant_id, application.id, run_id, &assessment)
            .await?;

        self.activities
            .record(NewActivity {
                tenant_id,
                application_id: application.id,
                candidate_id: candidate.id,
                job_id: job.id,
                activity_type: AI_SCREENING_COMPLETED.to_string(),
                payload: json!({
                    "ai_match_score": assessment.ai_match_score,
                    "assessment": assessment,
                    "match": {
                        "fit_score": match_result.fit_score,
                        "breakdown": match_result.breakdown,
                        "explanation": match_result.explanation,
                    },
                }),
            })
            .await;

        Ok(ScreeningOutcome {
            application_id: application.id,
            assessment,
            match_result,
        })
    }
}

/// Rejects anything outside the contract instead of storing a best guess.
pub fn validate_assessment(fit: FitAssessment) -> Result<ApplicationAssessment, PipelineError> {
    if !fit.score.is_finite() || !(0.0..=100.0).contains(&fit.score) {
        return Err(PipelineError::ProviderUnavailable(format!(
            "fit score {} is outside 0-100",
            fit.score
        )));
    }

    let recommendation: Recommendation = fit
        .recommendation
        .parse()
        .map_err(PipelineError::ProviderUnavailable)?;

    let clean = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let summary = fit.summary.trim();

    Ok(ApplicationAssessment {
        ai_match_score: Some(fit.score.round() as i16),
        ai_strengths: clean(fit.strengths),
        ai_concerns: clean(fit.concerns),
        ai_recommendation: Some(recommendation),
        ai_summary: (!summary.is_empty()).then(|| summary.to_string()),
        screened_at: Some(Utc::now()),
    })
}

pub fn job_context(job: &JobPosting) -> String {
    let location = match (job.is_remote, job.location.as_deref()) {
        (true, Some(loc)) => format!("Location: {loc} (remote allowed)"),
        (true, None) => "Location: remote".to_string(),
        (false, Some(loc)) => format!("Location: {loc}"),
        (false, None) => "Location: not specified".to_string(),
    };

    let mut lines = vec![job_synopsis(job), location];
    if !job.skills_required.is_empty() {
        lines.push(format!("Required skills: {}", job.skills_required.join(", ")));
    }
    if !job.skills_preferred.is_empty() {
        lines.push(format!("Preferred skills: {}", job.skills_preferred.join(", ")));
    }
    lines.join("\n\n")
}

pub fn candidate_context(candidate: &CandidateProfile, match_result: &MatchResult) -> String {
    let mut lines = vec![format!("Name: {}", candidate.display_name())];

    if let Some(position) = &candidate.current_position {
        match &candidate.current_company {
            Some(company) => lines.push(format!("Current role: {position} at {company}")),
            None => lines.push(format!("Current role: {position}")),
        }
    }
    if let Some(years) = candidate.total_experience_years {
        lines.push(format!("Total experience: {years} years"));
    }
    if let Some(location) = &candidate.location {
        lines.push(format!("Location: {location}"));
    }
    if candidate.open_to_remote {
        lines.push("Open to remote work".to_string());
    }
    if let Some(summary) = &candidate.summary {
        lines.push(format!("Summary: {summary}"));
    }

    let skills: Vec<&str> = candidate.skill_names().collect();
    if !skills.is_empty() {
        lines.push(format!("Skills: {}", skills.join(", ")));
    }

    for exp in &candidate.experience {
        let period = match (exp.start_date.as_deref(), exp.end_date.as_deref(), exp.is_current) {
            (Some(start), _, true) => format!(" ({start} – present)"),
            (Some(start), Some(end), false) => format!(" ({start} – {end})"),
            _ => String::new(),
        };
        let mut line = format!("- {} at {}{}", exp.title, exp.company, period);
        if let Some(description) = &exp.description {
            line.push_str(&format!(": {description}"));
        }
        lines.push(line);
    }

    for edu in &candidate.education {
        let degree = [edu.degree.as_deref(), edu.field.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        if degree.is_empty() {
            lines.push(format!("- Education: {}", edu.institution));
        } else {
            lines.push(format!("- Education: {degree}, {}", edu.institution));
        }
    }

    if !candidate.certifications.is_empty() {
        lines.push(format!("Certifications: {}", candidate.certifications.join(", ")));
    }

    if candidate.experience.is_empty() && skills.is_empty() {
        if let Some(text) = &candidate.resume_text {
            lines.push(format!("Resume:\n{text}"));
        }
    }

    lines.push(format!(
        "Structured match signals: fit {:.2}. {}",
        match_result.fit_score, match_result.explanation
    ));

    lines.join("\n")
}
