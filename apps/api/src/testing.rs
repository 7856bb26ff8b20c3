//! In-memory doubles for the pipeline seams, mirroring the Postgres semantics
//! closely enough for unit tests: generation guards, coalescing, lease ownership.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::errors::PipelineError;
use crate::llm_client::{FitAssessment, LanguageModel, LlmError};
use crate::matching::vector_index::{rank_neighbors, IndexedKind, Neighbor, VectorIndex};
use crate::models::activity::{ActivityRow, NewActivity};
use crate::models::application::{Application, ApplicationAssessment, ScreeningStatus};
use crate::models::candidate::{CandidateProfile, Skill};
use crate::models::job::JobPosting;
use crate::models::work_item::{NewWorkItem, WorkItem, WorkKind, WorkStatus};
use crate::profile::extractor::{ParsedProfile, StructuredProfile};
use crate::store::{ActivitySink, DocumentStore, ResumeDocument, Store};
use crate::tasks::queue::{RecoveryReport, WorkQueue};
use crate::tasks::signal::QueueSignal;

// ── Fixtures ────────────────────────────────────────────────────────────────

pub fn candidate(skills: Vec<&str>, years: Option<i32>) -> CandidateProfile {
    CandidateProfile {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        first_name: None,
        last_name: None,
        email: None,
        phone: None,
        location: None,
        linkedin_url: None,
        github_url: None,
        open_to_remote: false,
        summary: None,
        experience: vec![],
        education: vec![],
        skills: skills.into_iter().map(Skill::named).collect(),
        certifications: vec![],
        current_position: None,
        current_company: None,
        total_experience_years: years,
        resume_text: None,
        resume_generation: 0,
        embedding: None,
        embedding_generation: None,
        quality_score: None,
        created_at: Utc::now(),
    }
}

pub fn job(required: Vec<&str>, preferred: Vec<&str>) -> JobPosting {
    JobPosting {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        title: "Data Engineer".to_string(),
        description: None,
        requirements: None,
        responsibilities: None,
        department: None,
        skills_required: required.into_iter().map(String::from).collect(),
        skills_preferred: preferred.into_iter().map(String::from).collect(),
        experience_level: None,
        location: None,
        is_remote: false,
        embedding: None,
        content_generation: 0,
        created_at: Utc::now(),
    }
}

pub fn application(job: &JobPosting, candidate: &CandidateProfile) -> Application {
    Application {
        id: Uuid::new_v4(),
        tenant_id: job.tenant_id,
        job_id: job.id,
        candidate_id: candidate.id,
        assessment: ApplicationAssessment::default(),
        screening_status: ScreeningStatus::Unscreened,
        screening_started_at: None,
        last_screening_error: None,
        last_screening_failed_at: None,
        created_at: Utc::now(),
    }
}

pub fn work_item(tenant_id: Uuid, kind: WorkKind, target_id: Uuid, generation: i64) -> WorkItem {
    let now = Utc::now();
    WorkItem {
        id: Uuid::new_v4(),
        tenant_id,
        kind,
        target_id,
        generation,
        status: WorkStatus::Running,
        attempts: 1,
        last_error: None,
        worker_id: Some("test-worker".to_string()),
        lease_expires_at: Some(now + chrono::Duration::minutes(2)),
        run_after: now,
        created_at: now,
        updated_at: now,
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
    candidates: HashMap<Uuid, CandidateProfile>,
    resumes: HashMap<Uuid, ResumeDocument>,
    jobs: HashMap<Uuid, JobPosting>,
    applications: HashMap<Uuid, Application>,
    screening_runs: HashMap<Uuid, Uuid>,
    activities: Vec<ActivityRow>,
    documents: HashMap<String, Bytes>,
}

/// Implements every persistence seam over one mutex.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn insert_candidate(&self, candidate: CandidateProfile) {
        self.state
            .lock()
            .unwrap()
            .candidates
            .insert(candidate.id, candidate);
    }

    pub fn insert_job(&self, job: JobPosting) {
        self.state.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn insert_application(&self, application: Application) {
        self.state
            .lock()
            .unwrap()
            .applications
            .insert(application.id, application);
    }

    pub fn remove_job(&self, job_id: Uuid) {
        self.state.lock().unwrap().jobs.remove(&job_id);
    }

    pub fn candidate(&self, id: Uuid) -> Option<CandidateProfile> {
        self.state.lock().unwrap().candidates.get(&id).cloned()
    }

    pub fn job(&self, id: Uuid) -> Option<JobPosting> {
        self.state.lock().unwrap().jobs.get(&id).cloned()
    }

    pub fn document_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().documents.keys().cloned().collect()
    }

    pub fn application(&self, id: Uuid) -> Option<Application> {
        self.state.lock().unwrap().applications.get(&id).cloned()
    }

    pub fn activities(&self) -> Vec<NewActivity> {
        self.state
            .lock()
            .unwrap()
            .activities
            .iter()
            .map(|a| NewActivity {
                tenant_id: a.tenant_id,
                application_id: a.application_id,
                candidate_id: a.candidate_id,
                job_id: a.job_id,
                activity_type: a.activity_type.clone(),
                payload: a.payload.clone(),
            })
            .collect()
    }

    /// Simulates a run that started at `at` and never finished.
    pub fn mark_screening_started(&self, application_id: Uuid, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(app) = state.applications.get_mut(&application_id) {
            app.screening_status = ScreeningStatus::ScreeningInProgress;
            app.screening_started_at = Some(at);
            state.screening_runs.insert(application_id, Uuid::new_v4());
        }
    }

    /// Moves the current run's start time without changing which run owns it.
    pub fn backdate_screening(&self, application_id: Uuid, at: DateTime<Utc>) {
        if let Some(app) = self.state.lock().unwrap().applications.get_mut(&application_id) {
            app.screening_started_at = Some(at);
        }
    }
}

fn fill_blank(field: &mut Option<String>, value: &Option<String>) {
    if field.is_none() {
        field.clone_from(value);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<CandidateProfile>, PipelineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .candidates
            .get(&candidate_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_candidates(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<CandidateProfile>, PipelineError> {
        let mut pool: Vec<CandidateProfile> = self
            .state
            .lock()
            .unwrap()
            .candidates
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        pool.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pool)
    }

    async fn get_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<JobPosting>, PipelineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .get(&job_id)
            .filter(|j| j.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_application(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<Application>, PipelineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .applications
            .get(&application_id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_activities(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
    ) -> Result<Vec<ActivityRow>, PipelineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .activities
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn begin_resume_generation(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        document_key: &str,
        filename: &str,
    ) -> Result<i64, PipelineError> {
        let mut state = self.state.lock().unwrap();
        let candidate = state
            .candidates
            .get_mut(&candidate_id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| {
                PipelineError::DataInconsistency(format!("candidate {candidate_id} not found"))
            })?;
        candidate.resume_generation += 1;
        let generation = candidate.resume_generation;

        state.resumes.insert(
            candidate_id,
            ResumeDocument {
                key: document_key.to_string(),
                filename: filename.to_string(),
                generation,
            },
        );
        Ok(generation)
    }

    async fn get_resume_document(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<ResumeDocument>, PipelineError> {
        let state = self.state.lock().unwrap();
        let Some(candidate) = state
            .candidates
            .get(&candidate_id)
            .filter(|c| c.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        Ok(state.resumes.get(&candidate_id).map(|doc| ResumeDocument {
            generation: candidate.resume_generation,
            ..doc.clone()
        }))
    }

    async fn apply_parsed_resume(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        generation: i64,
        parsed: &ParsedProfile,
    ) -> Result<bool, PipelineError> {
        let mut state = self.state.lock().unwrap();
        let Some(c) = state.candidates.get_mut(&candidate_id).filter(|c| {
            c.tenant_id == tenant_id && c.resume_generation == generation
        }) else {
            return Ok(false);
        };

        fill_blank(&mut c.first_name, &parsed.first_name);
        fill_blank(&mut c.last_name, &parsed.last_name);
        fill_blank(&mut c.email, &parsed.contact.email);
        fill_blank(&mut c.phone, &parsed.contact.phone);
        fill_blank(&mut c.location, &parsed.location);
        fill_blank(&mut c.linkedin_url, &parsed.contact.linkedin);
        fill_blank(&mut c.github_url, &parsed.contact.github);
        c.summary.clone_from(&parsed.profile.summary);
        c.experience.clone_from(&parsed.profile.experience);
        c.education.clone_from(&parsed.profile.education);
        c.skills = parsed.profile.skills.iter().map(Skill::named).collect();
        c.certifications.clone_from(&parsed.profile.certifications);
        c.current_position.clone_from(&parsed.current_position);
        c.current_company.clone_from(&parsed.current_company);
        c.total_experience_years = parsed.profile.total_experience_years;
        c.resume_text = Some(parsed.resume_text.clone());
        c.quality_score = Some(parsed.quality_score);
        c.embedding = None;
        c.embedding_generation = None;
        Ok(true)
    }

    async fn set_candidate_embedding(
        &self,
        tenant_id: Uuid,
        candidate_id: Uuid,
        generation: i64,
        embedding: &[f32],
    ) -> Result<bool, PipelineError> {
        let mut state = self.state.lock().unwrap();
        match state.candidates.get_mut(&candidate_id).filter(|c| {
            c.tenant_id == tenant_id && c.resume_generation == generation
        }) {
            Some(c) => {
                c.embedding = Some(embedding.to_vec());
                c.embedding_generation = Some(generation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_job_embedding(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<i64, PipelineError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id)
            .filter(|j| j.tenant_id == tenant_id)
            .ok_or_else(|| PipelineError::DataInconsistency(format!("job {job_id} not found")))?;
        job.embedding = None;
        job.content_generation += 1;
        Ok(job.content_generation)
    }

    async fn set_job_embedding(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        generation: i64,
        embedding: &[f32],
    ) -> Result<bool, PipelineError> {
        let mut state = self.state.lock().unwrap();
        match state.jobs.get_mut(&job_id).filter(|j| {
            j.tenant_id == tenant_id && j.content_generation == generation
        }) {
            Some(j) => {
                j.embedding = Some(embedding.to_vec());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn begin_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> Result<Uuid, PipelineError> {
        let mut state = self.state.lock().unwrap();
        let app = state
            .applications
            .get_mut(&application_id)
            .filter(|a| a.tenant_id == tenant_id)
            .ok_or_else(|| {
                PipelineError::DataInconsistency(format!("application {application_id} not found"))
            })?;

        let in_flight = app.screening_status == ScreeningStatus::ScreeningInProgress
            && app.screening_started_at.is_some_and(|t| t >= stale_before);
        if in_flight {
            return Err(PipelineError::ConcurrencyConflict(format!(
                "application {application_id} is already being screened"
            )));
        }

        app.screening_status = ScreeningStatus::ScreeningInProgress;
        app.screening_started_at = Some(Utc::now());
        let run_id = Uuid::new_v4();
        state.screening_runs.insert(application_id, run_id);
        Ok(run_id)
    }

    async fn complete_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        run_id: Uuid,
        assessment: &ApplicationAssessment,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().unwrap();
        let app = owned_run(&mut state, tenant_id, application_id, run_id)?;
        app.assessment = assessment.clone();
        app.screening_status = ScreeningStatus::Screened;
        app.screening_started_at = None;
        app.last_screening_error = None;
        app.last_screening_failed_at = None;
        state.screening_runs.remove(&application_id);
        Ok(())
    }

    async fn fail_screening(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        run_id: Uuid,
        error: &str,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().unwrap();
        let app = owned_run(&mut state, tenant_id, application_id, run_id)?;
        app.screening_status = ScreeningStatus::ScreeningFailed;
        app.screening_started_at = None;
        app.last_screening_error = Some(error.to_string());
        app.last_screening_failed_at = Some(Utc::now());
        state.screening_runs.remove(&application_id);
        Ok(())
    }
}

/// Same guard as the SQL: the application must still be in progress under `run_id`.
fn owned_run(
    state: &mut StoreState,
    tenant_id: Uuid,
    application_id: Uuid,
    run_id: Uuid,
) -> Result<&mut Application, PipelineError> {
    let owns = state.screening_runs.get(&application_id) == Some(&run_id);
    let app = state
        .applications
        .get_mut(&application_id)
        .filter(|a| a.tenant_id == tenant_id)
        .ok_or_else(|| {
            PipelineError::DataInconsistency(format!("application {application_id} not found"))
        })?;
    if !owns || app.screening_status != ScreeningStatus::ScreeningInProgress {
        return Err(PipelineError::ConcurrencyConflict(format!(
            "application {application_id} was taken over by a newer screening run"
        )));
    }
    Ok(app)
}

#[async_trait]
impl ActivitySink for MemoryStore {
    async fn record(&self, activity: NewActivity) {
        self.state.lock().unwrap().activities.push(ActivityRow {
            id: Uuid::new_v4(),
            tenant_id: activity.tenant_id,
            application_id: activity.application_id,
            candidate_id: activity.candidate_id,
            job_id: activity.job_id,
            activity_type: activity.activity_type,
            payload: activity.payload,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), PipelineError> {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, PipelineError> {
        Ok(self.state.lock().unwrap().documents.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.state.lock().unwrap().documents.remove(key);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryStore {
    async fn nearest(
        &self,
        tenant_id: Uuid,
        kind: IndexedKind,
        query: &[f32],
        k: usize,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Neighbor>, PipelineError> {
        let state = self.state.lock().unwrap();
        let rows: Vec<(Uuid, Vec<f32>)> = match kind {
            IndexedKind::Candidate => state
                .candidates
                .values()
                .filter(|c| c.tenant_id == tenant_id)
                .filter_map(|c| c.embedding.clone().map(|e| (c.id, e)))
                .collect(),
            IndexedKind::Job => state
                .jobs
                .values()
                .filter(|j| j.tenant_id == tenant_id)
                .filter_map(|j| j.embedding.clone().map(|e| (j.id, e)))
                .collect(),
        };
        Ok(rank_neighbors(query, rows, k, exclude))
    }
}

// ── Work queue ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryWorkQueue {
    items: Mutex<Vec<WorkItem>>,
    heartbeats: AtomicUsize,
}

impl MemoryWorkQueue {
    pub fn items(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn item(&self, id: Uuid) -> Option<WorkItem> {
        self.items.lock().unwrap().iter().find(|i| i.id == id).cloned()
    }

    /// Makes a backed-off item claimable now.
    pub fn make_due(&self, id: Uuid) {
        self.update(id, |i| i.run_after = Utc::now() - chrono::Duration::seconds(1));
    }

    pub fn expire_lease(&self, id: Uuid) {
        self.update(id, |i| {
            i.lease_expires_at = Some(Utc::now() - chrono::Duration::seconds(1))
        });
    }

    /// Successful heartbeats so far.
    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut WorkItem)) {
        if let Some(item) = self.items.lock().unwrap().iter_mut().find(|i| i.id == id) {
            f(item);
        }
    }

    /// Applies `f` to the running item owned by `worker_id`. False if not owned.
    fn with_owned(&self, id: Uuid, worker_id: &str, f: impl FnOnce(&mut WorkItem)) -> bool {
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|i| {
            i.id == id && i.status == WorkStatus::Running && i.worker_id.as_deref() == Some(worker_id)
        }) {
            Some(item) => {
                f(item);
                item.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

fn lease_deadline(lease: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, new: NewWorkItem) -> Result<WorkItem, PipelineError> {
        let mut items = self.items.lock().unwrap();
        let same_target = |i: &WorkItem| i.kind == new.kind && i.target_id == new.target_id;

        if new.kind.rejects_duplicates() {
            if items.iter().any(|i| {
                same_target(i) && matches!(i.status, WorkStatus::Pending | WorkStatus::Running)
            }) {
                return Err(PipelineError::ConcurrencyConflict(format!(
                    "{} for {} is already queued or running",
                    new.kind, new.target_id
                )));
            }
        } else if let Some(pending) = items
            .iter_mut()
            .find(|i| same_target(i) && i.status == WorkStatus::Pending)
        {
            pending.generation = pending.generation.max(new.generation);
            pending.updated_at = Utc::now();
            return Ok(pending.clone());
        }

        let now = Utc::now();
        let item = WorkItem {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            kind: new.kind,
            target_id: new.target_id,
            generation: new.generation,
            status: WorkStatus::Pending,
            attempts: 0,
            last_error: None,
            worker_id: None,
            lease_expires_at: None,
            run_after: now,
            created_at: now,
            updated_at: now,
        };
        items.push(item.clone());
        Ok(item)
    }

    async fn claim(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<WorkItem>, PipelineError> {
        let mut items = self.items.lock().unwrap();
        let now = Utc::now();

        let candidate = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.status == WorkStatus::Pending && i.run_after <= now)
            .filter(|(_, i)| {
                !items.iter().any(|r| {
                    r.status == WorkStatus::Running
                        && r.kind == i.kind
                        && r.target_id == i.target_id
                })
            })
            .min_by(|(_, a), (_, b)| {
                a.run_after
                    .cmp(&b.run_after)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .map(|(idx, _)| idx);

        Ok(candidate.map(|idx| {
            let item = &mut items[idx];
            item.status = WorkStatus::Running;
            item.worker_id = Some(worker_id.to_string());
            item.attempts += 1;
            item.lease_expires_at = Some(lease_deadline(lease));
            item.updated_at = now;
            item.clone()
        }))
    }

    async fn heartbeat(
        &self,
        item_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> Result<bool, PipelineError> {
        let owned = self.with_owned(item_id, worker_id, |i| {
            i.lease_expires_at = Some(lease_deadline(lease))
        });
        if owned {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
        }
        Ok(owned)
    }

    async fn complete(&self, item_id: Uuid, worker_id: &str) -> Result<bool, PipelineError> {
        Ok(self.with_owned(item_id, worker_id, |i| {
            i.status = WorkStatus::Succeeded;
            i.lease_expires_at = None;
            i.last_error = None;
        }))
    }

    async fn retry(
        &self,
        item_id: Uuid,
        worker_id: &str,
        error: &str,
        run_after: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        let superseded = {
            let items = self.items.lock().unwrap();
            items.iter().find(|i| i.id == item_id).is_some_and(|me| {
                items.iter().any(|p| {
                    p.status == WorkStatus::Pending
                        && p.kind == me.kind
                        && p.target_id == me.target_id
                })
            })
        };
        if superseded {
            return self
                .fail(item_id, worker_id, &format!("{error} (superseded by queued retry)"))
                .await;
        }

        Ok(self.with_owned(item_id, worker_id, |i| {
            i.status = WorkStatus::Pending;
            i.worker_id = None;
            i.lease_expires_at = None;
            i.last_error = Some(error.to_string());
            i.run_after = run_after;
        }))
    }

    async fn fail(
        &self,
        item_id: Uuid,
        worker_id: &str,
        error: &str,
    ) -> Result<bool, PipelineError> {
        Ok(self.with_owned(item_id, worker_id, |i| {
            i.status = WorkStatus::Failed;
            i.lease_expires_at = None;
            i.last_error = Some(error.to_string());
        }))
    }

    async fn recover_stale(&self, max_attempts: i32) -> Result<RecoveryReport, PipelineError> {
        let mut items = self.items.lock().unwrap();
        let now = Utc::now();
        let pending: Vec<(WorkKind, Uuid)> = items
            .iter()
            .filter(|i| i.status == WorkStatus::Pending)
            .map(|i| (i.kind, i.target_id))
            .collect();

        let mut report = RecoveryReport::default();
        for item in items.iter_mut().filter(|i| {
            i.status == WorkStatus::Running && i.lease_expires_at.is_some_and(|t| t < now)
        }) {
            item.lease_expires_at = None;
            item.updated_at = now;
            if item.attempts >= max_attempts || pending.contains(&(item.kind, item.target_id)) {
                item.status = WorkStatus::Failed;
                item.last_error = Some("lease expired: worker lost".to_string());
                report.failed += 1;
            } else {
                item.status = WorkStatus::Pending;
                item.worker_id = None;
                item.last_error = Some("lease expired: requeued".to_string());
                item.run_after = now;
                report.requeued += 1;
            }
        }
        Ok(report)
    }

    async fn get(&self, tenant_id: Uuid, item_id: Uuid) -> Result<Option<WorkItem>, PipelineError> {
        Ok(self
            .item(item_id)
            .filter(|i| i.tenant_id == tenant_id))
    }
}

// ── Signal ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct LocalSignal {
    notify: Notify,
}

#[async_trait]
impl QueueSignal for LocalSignal {
    async fn notify(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

// ── Language model ──────────────────────────────────────────────────────────

/// Replays queued responses. An empty queue or an `Err` reads as a provider error.
pub struct ScriptedLanguageModel {
    profiles: Mutex<VecDeque<Result<StructuredProfile, String>>>,
    fits: Mutex<VecDeque<Result<FitAssessment, String>>>,
    fit_gate: watch::Sender<bool>,
}

impl Default for ScriptedLanguageModel {
    fn default() -> Self {
        Self {
            profiles: Mutex::default(),
            fits: Mutex::default(),
            fit_gate: watch::channel(true).0,
        }
    }
}

impl ScriptedLanguageModel {
    pub fn push_profile(&self, response: Result<StructuredProfile, String>) {
        self.profiles.lock().unwrap().push_back(response);
    }

    pub fn push_fit(&self, response: Result<FitAssessment, String>) {
        self.fits.lock().unwrap().push_back(response);
    }

    /// `score_fit` calls block until `release_fit_calls`.
    pub fn hold_fit_calls(&self) {
        self.fit_gate.send_replace(false);
    }

    pub fn release_fit_calls(&self) {
        self.fit_gate.send_replace(true);
    }
}

fn scripted<T>(queue: &Mutex<VecDeque<Result<T, String>>>) -> Result<T, LlmError> {
    match queue.lock().unwrap().pop_front() {
        Some(Ok(value)) => Ok(value),
        Some(Err(message)) => Err(LlmError::Api {
            status: 500,
            message,
        }),
        None => Err(LlmError::Api {
            status: 500,
            message: "no scripted response".to_string(),
        }),
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn extract_profile(&self, _resume_text: &str) -> Result<StructuredProfile, LlmError> {
        scripted(&self.profiles)
    }

    async fn score_fit(
        &self,
        _job_context: &str,
        _candidate_context: &str,
    ) -> Result<FitAssessment, LlmError> {
        let mut gate = self.fit_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        scripted(&self.fits)
    }
}

// ── Embedding providers ─────────────────────────────────────────────────────

/// Returns the same vector for every input.
pub struct StaticEmbedder {
    vector: Vec<f32>,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Provider("503 Service Unavailable".to_string()))
    }
}

/// Sleeps before answering; pair with a shorter gateway timeout.
pub struct SlowEmbedder(pub Duration);

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.0).await;
        Ok(vec![1.0; 3])
    }
}
