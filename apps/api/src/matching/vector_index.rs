//! Nearest-neighbour retrieval over stored embeddings, always scoped to one tenant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::matching::scorer::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedKind {
    Candidate,
    Job,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: Uuid,
    pub similarity: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` entities of `kind` closest to `query`, most similar first.
    async fn nearest(
        &self,
        tenant_id: Uuid,
        kind: IndexedKind,
        query: &[f32],
        k: usize,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Neighbor>, PipelineError>;
}

/// Exact (brute-force) ranking. Ties break on id so results are stable.
pub fn rank_neighbors(
    query: &[f32],
    rows: impl IntoIterator<Item = (Uuid, Vec<f32>)>,
    k: usize,
    exclude: Option<Uuid>,
) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = rows
        .into_iter()
        .filter(|(id, embedding)| Some(*id) != exclude && !embedding.is_empty())
        .map(|(id, embedding)| Neighbor {
            id,
            similarity: cosine_similarity(query, &embedding),
        })
        .collect();

    neighbors.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.id.cmp(&b.id))
    });
    neighbors.truncate(k);
    neighbors
}

/// Scans the tenant's stored embeddings and ranks them in-process.
pub struct PgVectorIndex {
    pool: PgPool,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn nearest(
        &self,
        tenant_id: Uuid,
        kind: IndexedKind,
        query: &[f32],
        k: usize,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Neighbor>, PipelineError> {
        let sql = match kind {
            IndexedKind::Candidate => {
                "SELECT id, embedding FROM candidates WHERE tenant_id = $1 AND embedding IS NOT NULL"
            }
            IndexedKind::Job => {
                "SELECT id, embedding FROM jobs WHERE tenant_id = $1 AND embedding IS NOT NULL"
            }
        };

        let rows: Vec<(Uuid, Vec<f32>)> = sqlx::query_as(sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;

        let query = query.to_vec();
        tokio::task::spawn_blocking(move || rank_neighbors(&query, rows, k, exclude))
            .await
            .map_err(|e| PipelineError::Storage(format!("vector ranking aborted: {e}")))
    }
}
