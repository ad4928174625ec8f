use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::Sessions;

/// All columns in row-mapping order
fn all_columns() -> [Sessions; 13] {
    [
        Sessions::Id,
        Sessions::Title,
        Sessions::SourceUrl,
        Sessions::DurationSeconds,
        Sessions::Transcript,
        Sessions::SummaryJson,
        Sessions::VideoUrl,
        Sessions::HasVideo,
        Sessions::SummaryEmbedding,
        Sessions::ThumbnailData,
        Sessions::ThumbnailMime,
        Sessions::ArtifactHash,
        Sessions::CreatedAt,
    ]
}

/// INSERT INTO sessions (id, title, source_url, duration_seconds, transcript,
/// summary_json, video_url, has_video, summary_embedding, thumbnail_data,
/// thumbnail_mime, artifact_hash, created_at) VALUES (...)
#[allow(clippy::too_many_arguments)]
pub fn insert(
    id: &str,
    title: &str,
    source_url: &str,
    duration_seconds: i64,
    transcript: &str,
    summary_json: &str,
    video_url: Option<&str>,
    has_video: bool,
    summary_embedding: &str,
    thumbnail_data: Option<&[u8]>,
    thumbnail_mime: Option<&str>,
    artifact_hash: Option<&str>,
    created_at: &str,
) -> String {
    Query::insert()
        .into_table(Sessions::Table)
        .columns(all_columns())
        .values_panic([
            id.into(),
            title.into(),
            source_url.into(),
            duration_seconds.into(),
            transcript.into(),
            summary_json.into(),
            video_url.into(),
            (has_video as i32).into(),
            summary_embedding.into(),
            thumbnail_data.map(|d| d.to_vec()).into(),
            thumbnail_mime.into(),
            artifact_hash.into(),
            created_at.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM sessions WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns(all_columns())
        .from(Sessions::Table)
        .and_where(Expr::col(Sessions::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM sessions ORDER BY created_at DESC LIMIT ?
pub fn select_recent(limit: u64) -> String {
    Query::select()
        .columns(all_columns())
        .from(Sessions::Table)
        .order_by(Sessions::CreatedAt, Order::Desc)
        .limit(limit)
        .to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM sessions WHERE artifact_hash = ?
/// ORDER BY created_at DESC LIMIT 1
pub fn select_by_artifact_hash(artifact_hash: &str) -> String {
    Query::select()
        .columns(all_columns())
        .from(Sessions::Table)
        .and_where(Expr::col(Sessions::ArtifactHash).eq(artifact_hash))
        .order_by(Sessions::CreatedAt, Order::Desc)
        .limit(1)
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, summary_embedding FROM sessions ORDER BY created_at DESC LIMIT ?
/// Candidate set for the in-process cosine scan
pub fn select_recent_embeddings(limit: u64) -> String {
    Query::select()
        .columns([Sessions::Id, Sessions::SummaryEmbedding])
        .from(Sessions::Table)
        .order_by(Sessions::CreatedAt, Order::Desc)
        .limit(limit)
        .to_string(SqliteQueryBuilder)
}

/// UPDATE sessions SET video_url = ?, has_video = ? WHERE id = ?
/// Both columns move together so the has_video invariant holds in the row
pub fn update_video(id: &str, video_url: Option<&str>) -> String {
    Query::update()
        .table(Sessions::Table)
        .values([
            (Sessions::VideoUrl, video_url.into()),
            (Sessions::HasVideo, (video_url.is_some() as i32).into()),
        ])
        .and_where(Expr::col(Sessions::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM sessions WHERE id = ?
pub fn delete_by_id(id: &str) -> String {
    Query::delete()
        .from_table(Sessions::Table)
        .and_where(Expr::col(Sessions::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
