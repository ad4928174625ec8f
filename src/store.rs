//! Record store over SQLite
//!
//! Document-style access for session and suggested-task records. The store
//! assigns durable ids on insert (they never collide with the pipeline's
//! temporary uuids) and exposes an in-process watch channel for newly
//! inserted tasks, which drives the suggestion fan-out.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, warn};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;

use crate::constants::{generate_record_id, EMBED_DIM};
use crate::error::StoreError;
use crate::models::{Session, SessionSummary, SuggestedTask, TaskStatus, Thumbnail, WorkspaceService};
use crate::queries::{sessions, tasks};

/// How many recent rows the cosine scan considers
const VECTOR_SEARCH_CANDIDATES: u64 = 500;

/// Canonical timestamp form used in every stored and broadcast record
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
    task_inserts: broadcast::Sender<SuggestedTask>,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (task_inserts, _) = broadcast::channel(64);
        RecordStore { pool, task_inserts }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Subscribe to newly inserted suggested tasks
    /// Best-effort: subscribers that lag simply miss entries
    pub fn watch_task_inserts(&self) -> broadcast::Receiver<SuggestedTask> {
        self.task_inserts.subscribe()
    }

    // ===================== sessions =====================

    /// Insert a session record, returning the durable id assigned by the store
    pub async fn insert_session(&self, session: &Session) -> Result<String, StoreError> {
        if !session.embedding_is_valid() {
            return Err(StoreError::InvalidRecord(format!(
                "summary_embedding must have length {}, got {}",
                EMBED_DIM,
                session.summary_embedding.len()
            )));
        }
        if session.has_video != session.video_url.is_some() {
            return Err(StoreError::InvalidRecord(
                "has_video is inconsistent with video_url".to_string(),
            ));
        }

        let durable_id = generate_record_id("s");
        let summary_json = serde_json::to_string(&session.summary)
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let embedding_json = serde_json::to_string(&session.summary_embedding)
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let sql = sessions::insert(
            &durable_id,
            &session.title,
            &session.source_url,
            session.duration_seconds as i64,
            &session.transcript,
            &summary_json,
            session.video_url.as_deref(),
            session.has_video,
            &embedding_json,
            session.thumbnail.as_ref().map(|t| t.data.as_slice()),
            session.thumbnail.as_ref().map(|t| t.mime_type.as_str()),
            session.artifact_hash.as_deref(),
            &canonical_timestamp(session.created_at),
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(durable_id)
    }

    pub async fn find_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sql = sessions::select_by_id(id);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    /// Recent sessions, newest first
    pub async fn list_sessions(&self, limit: u64) -> Result<Vec<Session>, StoreError> {
        let sql = sessions::select_recent(limit);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_session).collect()
    }

    /// Enrichment reuse lookup: latest session sharing the content hash
    pub async fn find_session_by_artifact_hash(
        &self,
        artifact_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let sql = sessions::select_by_artifact_hash(artifact_hash);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    /// Maintenance path (video backfill): set or clear the video URL
    /// has_video moves with it in the same statement
    pub async fn update_session_video(
        &self,
        id: &str,
        video_url: Option<&str>,
    ) -> Result<bool, StoreError> {
        let sql = sessions::update_video(id, video_url);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let sql = sessions::delete_by_id(id);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Nearest-neighbor lookup over stored summary embeddings.
    /// Best-effort: any failure yields an empty result, never an error.
    pub async fn vector_search_sessions(&self, query: &[f32], limit: usize) -> Vec<Session> {
        if query.len() != EMBED_DIM {
            warn!(
                "vector_search called with dimension {} (expected {})",
                query.len(),
                EMBED_DIM
            );
            return Vec::new();
        }

        let sql = sessions::select_recent_embeddings(VECTOR_SEARCH_CANDIDATES);
        let rows = match sqlx::query(&sql).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("vector_search candidate scan failed: {}", e);
                return Vec::new();
            }
        };

        let mut scored: Vec<(String, f32)> = rows
            .iter()
            .filter_map(|row| {
                let id: String = row.get(0);
                let embedding_json: String = row.get(1);
                let embedding: Vec<f32> = serde_json::from_str(&embedding_json).ok()?;
                if embedding.len() != EMBED_DIM {
                    return None;
                }
                Some((id, cosine_similarity(query, &embedding)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for (id, _) in scored {
            match self.find_session(&id).await {
                Ok(Some(session)) => results.push(session),
                Ok(None) => {}
                Err(e) => {
                    error!("vector_search row fetch failed for {}: {}", id, e);
                    return Vec::new();
                }
            }
        }
        results
    }

    // ===================== suggested tasks =====================

    /// Insert a suggested task, returning the durable id.
    /// Notifies the insert watch channel after the row is committed.
    pub async fn insert_task(&self, task: &SuggestedTask) -> Result<String, StoreError> {
        task.validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let durable_id = generate_record_id("t");
        let params_json = match &task.params {
            Some(params) => Some(
                serde_json::to_string(params)
                    .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
            ),
            None => None,
        };
        let sql = tasks::insert(
            &durable_id,
            &task.title,
            &task.description,
            task.service.map(|s| s.as_str()),
            task.action.as_deref(),
            params_json.as_deref(),
            task.status.as_str(),
            &canonical_timestamp(task.created_at),
            task.source_context.as_deref(),
        );
        sqlx::query(&sql).execute(&self.pool).await?;

        let mut inserted = task.clone();
        inserted.id = durable_id.clone();
        // No subscribers is fine; fan-out may not be running in tests
        let _ = self.task_inserts.send(inserted);

        Ok(durable_id)
    }

    pub async fn find_task(&self, id: &str) -> Result<Option<SuggestedTask>, StoreError> {
        let sql = tasks::select_by_id(id);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_task(&r)).transpose()
    }

    /// Recent tasks, newest first, optionally filtered by status
    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: u64,
    ) -> Result<Vec<SuggestedTask>, StoreError> {
        let sql = tasks::select_recent(status.map(|s| s.as_str()), limit);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    /// The bounded non-terminal subset pushed to extension clients
    pub async fn list_open_tasks(&self, limit: u64) -> Result<Vec<SuggestedTask>, StoreError> {
        let sql = tasks::select_recent_open(limit);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Unconditional status write (maintenance path)
    pub async fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let sql = tasks::update_status(id, status.as_str(), &canonical_timestamp(Utc::now()));
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Conditional status claim: only moves the row if it still holds the
    /// expected status. Returns false when another writer won the race.
    pub async fn claim_task_status(
        &self,
        id: &str,
        expected: TaskStatus,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let sql = tasks::update_status_from(
            id,
            expected.as_str(),
            status.as_str(),
            &canonical_timestamp(Utc::now()),
        );
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        let sql = tasks::delete_by_id(id);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Map a sessions row to the model
/// has_video is derived from video_url so the invariant holds on every read
fn row_to_session(row: &SqliteRow) -> Result<Session, StoreError> {
    let summary_json: String = row.get(5);
    let summary: SessionSummary = serde_json::from_str(&summary_json)
        .map_err(|e| StoreError::InvalidRecord(format!("bad summary_json: {}", e)))?;
    let embedding_json: String = row.get(8);
    let summary_embedding: Vec<f32> = serde_json::from_str(&embedding_json)
        .map_err(|e| StoreError::InvalidRecord(format!("bad summary_embedding: {}", e)))?;
    let thumbnail_data: Option<Vec<u8>> = row.get(9);
    let thumbnail_mime: Option<String> = row.get(10);
    let thumbnail = match (thumbnail_data, thumbnail_mime) {
        (Some(data), Some(mime_type)) => Some(Thumbnail { data, mime_type }),
        _ => None,
    };
    let created_at_raw: String = row.get(12);
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map_err(|e| StoreError::InvalidRecord(format!("bad created_at: {}", e)))?
        .with_timezone(&Utc);
    let video_url: Option<String> = row.get(6);
    let duration_seconds: i64 = row.get(3);

    Ok(Session {
        id: row.get(0),
        title: row.get(1),
        source_url: row.get(2),
        duration_seconds: duration_seconds.max(0) as u64,
        transcript: row.get(4),
        summary,
        has_video: video_url.is_some(),
        video_url,
        summary_embedding,
        thumbnail,
        artifact_hash: row.get(11),
        created_at,
    })
}

/// Map a suggested_tasks row to the model
fn row_to_task(row: &SqliteRow) -> Result<SuggestedTask, StoreError> {
    let service_raw: Option<String> = row.get(3);
    let service = match service_raw {
        Some(s) => Some(WorkspaceService::parse(&s).ok_or_else(|| {
            StoreError::InvalidRecord(format!("unknown workspace service: {}", s))
        })?),
        None => None,
    };
    let params_raw: Option<String> = row.get(5);
    let params = match params_raw {
        Some(p) => Some(
            serde_json::from_str(&p)
                .map_err(|e| StoreError::InvalidRecord(format!("bad params: {}", e)))?,
        ),
        None => None,
    };
    let status_raw: String = row.get(6);
    let status = TaskStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::InvalidRecord(format!("unknown status: {}", status_raw)))?;
    let created_at_raw: String = row.get(7);
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map_err(|e| StoreError::InvalidRecord(format!("bad created_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(SuggestedTask {
        id: row.get(0),
        title: row.get(1),
        description: row.get(2),
        service,
        action: row.get(4),
        params,
        status,
        created_at,
        source_context: row.get(9),
    })
}

/// Cosine similarity with a zero-norm guard
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        let zero = vec![0.0f32; 4];
        let unit = vec![1.0f32, 0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &unit), 0.0);
        assert!((cosine_similarity(&unit, &unit) - 1.0).abs() < 1e-6);
    }
}
