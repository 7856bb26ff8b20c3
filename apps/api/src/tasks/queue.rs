//! Durable work-item queue.
//!
//! Invariants kept by the table and by the claim query together:
//! - at most one `running` item per (kind, target)
//! - at most one `pending` item per (kind, target); enqueues coalesce into it
//! - a `running` item always carries a worker id and a lease; expired leases are
//!   recovered by the sweep

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::work_item::{NewWorkItem, WorkItem, WorkItemRow};

const WORK_ITEM_COLUMNS: &str = r#"
    id, tenant_id, kind, target_id, generation, status, attempts, last_error,
    worker_id, lease_expires_at, run_after, created_at, updated_at
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub requeued: u64,
    pub failed: u64,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Queues work, coalescing with an existing pending item for the same
    /// (kind, target). Kinds that reject duplicates fail with `ConcurrencyConflict`
    /// instead when one is already pending or running.
    async fn enqueue(&self, item: NewWorkItem) -> Result<WorkItem, PipelineError>;

    /// Atomically moves one due pending item to running under `worker_id`.
    async fn claim(&self, worker_id: &str, lease: Duration)
        -> Result<Option<WorkItem>, PipelineError>;

    /// Extends the lease. False means the worker no longer owns the item.
    async fn heartbeat(
        &self,
        item_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> Result<bool, PipelineError>;

    async fn complete(&self, item_id: Uuid, worker_id: &str) -> Result<bool, PipelineError>;

    /// Returns the item to pending, not claimable before `run_after`.
    async fn retry(
        &self,
        item_id: Uuid,
        worker_id: &str,
        error: &str,
        run_after: DateTime<Utc>,
    ) -> Result<bool, PipelineError>;

    async fn fail(&self, item_id: Uuid, worker_id: &str, error: &str)
        -> Result<bool, PipelineError>;

    /// Requeues running items whose lease expired, or fails them once
    /// `max_attempts` is spent.
    async fn recover_stale(&self, max_attempts: i32) -> Result<RecoveryReport, PipelineError>;

    async fn get(&self, tenant_id: Uuid, item_id: Uuid) -> Result<Option<WorkItem>, PipelineError>;
}

pub struct PgWorkQueue {
    pool: PgPool,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_item(row: WorkItemRow) -> Result<WorkItem, PipelineError> {
    WorkItem::try_from(row).map_err(PipelineError::Storage)
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, item: NewWorkItem) -> Result<WorkItem, PipelineError> {
        let sql = if item.kind.rejects_duplicates() {
            format!(
                r#"
                INSERT INTO work_items (id, tenant_id, kind, target_id, generation)
                SELECT $1, $2, $3, $4, $5
                WHERE NOT EXISTS (
                    SELECT 1 FROM work_items
                    WHERE kind = $3 AND target_id = $4 AND status IN ('pending', 'running')
                )
                ON CONFLICT (kind, target_id) WHERE status = 'pending' DO NOTHING
                RETURNING {WORK_ITEM_COLUMNS}
                "#
            )
        } else {
            format!(
                r#"
                INSERT INTO work_items (id, tenant_id, kind, target_id, generation)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (kind, target_id) WHERE status = 'pending'
                DO UPDATE SET generation = GREATEST(work_items.generation, EXCLUDED.generation),
                              updated_at = now()
                RETURNING {WORK_ITEM_COLUMNS}
                "#
            )
        };

        let row: Option<WorkItemRow> = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(item.tenant_id)
            .bind(item.kind.as_str())
            .bind(item.target_id)
            .bind(item.generation)
            .fetch_optional(&self.pool)
            .await?;

        let row = row.ok_or_else(|| {
            PipelineError::ConcurrencyConflict(format!(
                "{} for {} is already queued or running",
                item.kind, item.target_id
            ))
        })?;

        let queued = into_item(row)?;
        debug!(
            "Enqueued {} for {} (item {}, generation {})",
            queued.kind, queued.target_id, queued.id, queued.generation
        );
        Ok(queued)
    }

    async fn claim(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<WorkItem>, PipelineError> {
        let result: Result<Option<WorkItemRow>, sqlx::Error> = sqlx::query_as(&format!(
            r#"
            UPDATE work_items
            SET status = 'running',
                worker_id = $1,
                attempts = attempts + 1,
                lease_expires_at = now() + make_interval(secs => $2),
                updated_at = now()
            WHERE id = (
                SELECT w.id FROM work_items w
                WHERE w.status = 'pending'
                  AND w.run_after <= now()
                  AND NOT EXISTS (
                      SELECT 1 FROM work_items r
                      WHERE r.kind = w.kind AND r.target_id = w.target_id AND r.status = 'running'
                  )
                ORDER BY w.run_after, w.created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {WORK_ITEM_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => row.map(into_item).transpose(),
            // Lost a race against another worker for the same (kind, target).
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn heartbeat(
        &self,
        item_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET lease_expires_at = now() + make_interval(secs => $3), updated_at = now()
            WHERE id = $1 AND worker_id = $2 AND status = 'running'
            "#,
        )
        .bind(item_id)
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, item_id: Uuid, worker_id: &str) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'succeeded', lease_expires_at = NULL, last_error = NULL, updated_at = now()
            WHERE id = $1 AND worker_id = $2 AND status = 'running'
            "#,
        )
        .bind(item_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn retry(
        &self,
        item_id: Uuid,
        worker_id: &str,
        error: &str,
        run_after: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending',
                worker_id = NULL,
                lease_expires_at = NULL,
                last_error = $3,
                run_after = $4,
                updated_at = now()
            WHERE id = $1 AND worker_id = $2 AND status = 'running'
              AND NOT EXISTS (
                  SELECT 1 FROM work_items p
                  WHERE p.kind = work_items.kind AND p.target_id = work_items.target_id
                    AND p.status = 'pending'
              )
            "#,
        )
        .bind(item_id)
        .bind(worker_id)
        .bind(error)
        .bind(run_after)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // A newer pending item already covers this target; let it carry the work.
        self.fail(item_id, worker_id, &format!("{error} (superseded by queued retry)"))
            .await
    }

    async fn fail(
        &self,
        item_id: Uuid,
        worker_id: &str,
        error: &str,
    ) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'failed', lease_expires_at = NULL, last_error = $3, updated_at = now()
            WHERE id = $1 AND worker_id = $2 AND status = 'running'
            "#,
        )
        .bind(item_id)
        .bind(worker_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recover_stale(&self, max_attempts: i32) -> Result<RecoveryReport, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let failed = sqlx::query(
            r#"
            UPDATE work_items w
            SET status = 'failed',
                lease_expires_at = NULL,
                last_error = 'lease expired: worker lost',
                updated_at = now()
            WHERE w.status = 'running' AND w.lease_expires_at < now()
              AND (w.attempts >= $1 OR EXISTS (
                  SELECT 1 FROM work_items p
                  WHERE p.kind = w.kind AND p.target_id = w.target_id AND p.status = 'pending'
              ))
            "#,
        )
        .bind(max_attempts)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending',
                worker_id = NULL,
                lease_expires_at = NULL,
                last_error = 'lease expired: requeued',
                run_after = now(),
                updated_at = now()
            WHERE status = 'running' AND lease_expires_at < now()
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if requeued > 0 || failed > 0 {
            warn!("Recovered stale work items: {requeued} requeued, {failed} failed");
        } else {
            debug!("Stale work sweep found nothing");
        }

        Ok(RecoveryReport { requeued, failed })
    }

    async fn get(&self, tenant_id: Uuid, item_id: Uuid) -> Result<Option<WorkItem>, PipelineError> {
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(item_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_item).transpose()
    }
}

/// Exponential backoff for the `attempts`-th failure: base·2^(attempts-1), capped.
pub fn backoff_delay(attempts: i32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    base.saturating_mul(2u32.saturating_pow(exponent)).min(cap)
}
