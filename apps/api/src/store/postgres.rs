use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::activity::{ActivityRow, NewActivity};
use crate::models::application::{Application, ApplicationAssessment, ApplicationRow};
use crate::models::candidate::{CandidateProfile, CandidateRow, Skill};
use crate::models::job::{JobPosting, JobRow};
use crate::profile::extractor::ParsedProfile;
use crate::store::{ActivitySink, ResumeDocument, Store};

const CANDIDATE_COLUMNS: &str = r#"
    id, tenant_id, first_name, last_name, email, phone, location, linkedin_url, github_url,
    open_to_remote, summary, experience, education, skills, certifications,
    current_position, current_company, total_experience_years, resume_text,
    resume_generation, embedding, embedding_generation, quality_score, created_at
"#;

const JOB_COLUMNS: &str = r#"
    id, tenant_id, title, description, requirements, responsibilities, department,
    skills_required, skills_preferred, experience_level, location, is_remote,
    embedding, content_generation, created_at
"#;

const APPLICATION_COLUMNS: &str = r#"
    id, tenant_id, job_id, candidate_id, ai_match_score, ai_strengths, ai_concerns,
    ai_recommendation, ai_summary, screened_at, screening_status, screening_started_at,
    last_screening_error, last_screening_failed_at, created_at
"#;

const SUPERSEDED: &str = "was taken over by a newer screening run";

/// PostgreSQL-backed store. Also serves as the activity sink.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A guarded screening write matched nothing: either another run owns the
    /// application or the application is gone.
    async fn screening_conflict(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        reason: &str,
    ) -> Result<PipelineError, PipelineError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM applications WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(application_id)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if exists {
            PipelineError::ConcurrencyConflict(format!("application {application_id} {reason}"))
        } else {
            PipelineError::DataInconsistency(format!("application {application_id} not found"))
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<CandidateProfile>, PipelineError> {
        let row: Option<CandidateRow> = sqlx::query_as(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(candidate_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CandidateProfile::from))
    }

    async fn list_candidates(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<CandidateProfile>, PipelineError> {
        let rows: Vec<CandidateRow> = sqlx::query_as(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE tenant_id = $1 ORDER BY created_at, id"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CandidateProfile::from).collect())
    }

    async fn get_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<JobPosting>, PipelineError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JobPosting::from))
    }

    async fn get_application(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<Application>, PipelineError> {
        let row: Option<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(application_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Application::from))
    }

    async fn list_activities(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<Vec<ActivityRow>, PipelineError> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, tenant_id, application_id, candidate_id, job_id, activity_type, payload, created_at
            FROM activities
            WHERE tenant_id = $1 AND application_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn begin_resume_generation(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        document_key: &str,
        filename: &str,
    ) -> Result<i64, PipelineError> {
        let generation: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE candidates
            SET resume_generation = resume_generation + 1,
                resume_key = $3,
                resume_filename = $4,
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING resume_generation
            "#,
        )
        .bind(candidate_id)
        .bind(tenant_id)
        .bind(document_key)
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        let generation = generation.ok_or_else(|| {
            PipelineError::DataInconsistency(format!("candidate {candidate_id} not found"))
        })?;
        info!("Candidate {candidate_id} resume generation is now {generation}");
        Ok(generation)
    }

    async fn get_resume_document(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<ResumeDocument>, PipelineError> {
        let row: Option<(Option<String>, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT resume_key, resume_filename, resume_generation
            FROM candidates
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(candidate_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((Some(key), Some(filename), generation)) => Some(ResumeDocument {
                key,
                filename,
                generation,
            }),
            _ => None,
        })
    }

    async fn apply_parsed_resume(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        generation: i64,
        parsed: &ParsedProfile,
    ) -> Result<bool, PipelineError> {
        let skills: Vec<Skill> = parsed.profile.skills.iter().map(Skill::named).collect();

        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET first_name = COALESCE(first_name, $4),
                last_name = COALESCE(last_name, $5),
                email = COALESCE(email, $6),
                phone = COALESCE(phone, $7),
                location = COALESCE(location, $8),
                linkedin_url = COALESCE(linkedin_url, $9),
                github_url = COALESCE(github_url, $10),
                summary = $11,
                experience = $12,
                education = $13,
                skills = $14,
                certifications = $15,
                current_position = $16,
                current_company = $17,
                total_experience_years = $18,
                resume_text = $19,
                quality_score = $20,
                embedding = NULL,
                embedding_generation = NULL,
                parsed_at = now(),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2 AND resume_generation = $3
            "#,
        )
        .bind(candidate_id)
        .bind(tenant_id)
        .bind(generation)
        .bind(&parsed.first_name)
        .bind(&parsed.last_name)
        .bind(&parsed.contact.email)
        .bind(&parsed.contact.phone)
        .bind(&parsed.location)
        .bind(&parsed.contact.linkedin)
        .bind(&parsed.contact.github)
        .bind(&parsed.profile.summary)
        .bind(Json(&parsed.profile.experience))
        .bind(Json(&parsed.profile.education))
        .bind(Json(&skills))
        .bind(&parsed.profile.certifications)
        .bind(&parsed.current_position)
        .bind(&parsed.current_company)
        .bind(parsed.profile.total_experience_years)
        .bind(&parsed.resume_text)
        .bind(parsed.quality_score)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_candidate_embedding(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        generation: i64,
        embedding: &[f32],
    ) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET embedding = $4, embedding_generation = $3, updated_at = now()
            WHERE id = $1 AND tenant_id = $2 AND resume_generation = $3
            "#,
        )
        .bind(candidate_id)
        .bind(tenant_id)
        .bind(generation)
        .bind(embedding)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_job_embedding(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<i64, PipelineError> {
        let generation: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET embedding = NULL,
                content_generation = content_generation + 1,
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING content_generation
            "#,
        )
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        generation.ok_or_else(|| PipelineError::DataInconsistency(format!("job {job_id} not found")))
    }

    async fn set_job_embedding(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        generation: i64,
        embedding: &[f32],
    ) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET embedding = $4, updated_at = now()
            WHERE id = $1 AND tenant_id = $2 AND content_generation = $3
            "#,
        )
        .bind(job_id)
        .bind(tenant_id)
        .bind(generation)
        .bind(embedding)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn begin_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> Result<Uuid, PipelineError> {
        let run_id = Uuid::new_v4();
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE applications
            SET screening_status = 'screening_in_progress',
                screening_started_at = now(),
                screening_run_id = $4,
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
              AND (screening_status <> 'screening_in_progress'
                   OR screening_started_at IS NULL
                   OR screening_started_at < $3)
            RETURNING id
            "#,
        )
        .bind(application_id)
        .bind(tenant_id)
        .bind(stale_before)
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(run_id);
        }

        Err(self
            .screening_conflict(tenant_id, application_id, "is already being screened")
            .await?)
    }

    async fn complete_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        run_id: Uuid,
        assessment: &ApplicationAssessment,
    ) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET ai_match_score = $4,
                ai_strengths = $5,
                ai_concerns = $6,
                ai_recommendation = $7,
                ai_summary = $8,
                screened_at = $9,
                screening_status = 'screened',
                screening_started_at = NULL,
                screening_run_id = NULL,
                last_screening_error = NULL,
                last_screening_failed_at = NULL,
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
              AND screening_status = 'screening_in_progress'
              AND screening_run_id = $3
            "#,
        )
        .bind(application_id)
        .bind(tenant_id)
        .bind(run_id)
        .bind(assessment.ai_match_score)
        .bind(&assessment.ai_strengths)
        .bind(&assessment.ai_concerns)
        .bind(assessment.ai_recommendation.map(|r| r.as_str()))
        .bind(&assessment.ai_summary)
        .bind(assessment.screened_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .screening_conflict(tenant_id, application_id, SUPERSEDED)
                .await?);
        }
        Ok(())
    }

    async fn fail_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        run_id: Uuid,
        error: &str,
    ) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET screening_status = 'screening_failed',
                screening_started_at = NULL,
                screening_run_id = NULL,
                last_screening_error = $4,
                last_screening_failed_at = now(),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
              AND screening_status = 'screening_in_progress'
              AND screening_run_id = $3
            "#,
        )
        .bind(application_id)
        .bind(tenant_id)
        .bind(run_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .screening_conflict(tenant_id, application_id, SUPERSEDED)
                .await?);
        }
        Ok(())
    }
}


#[async_trait]
impl ActivitySink for PgStore {
    async fn record(&self, activity: NewActivity) {
        let result = sqlx::query(
            r#"
            INSERT INTO activities
                (id, tenant_id, application_id, candidate_id, job_id, activity_type, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(activity.tenant_id)
        .bind(activity.application_id)
        .bind(activity.candidate_id)
        .bind(activity.job_id)
        .bind(&activity.activity_type)
        .bind(&activity.payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => debug!(
                "Recorded {} activity for application {}",
                activity.activity_type, activity.application_id
            ),
            Err(e) => error!(
                "Failed to record {} activity for application {}: {e}",
                activity.activity_type, activity.application_id
            ),
        }
    }
}
