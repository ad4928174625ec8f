use sea_query::{ColumnDef, Index, SqliteQueryBuilder, Table};

use crate::schema::{Sessions, SuggestedTasks};

/// CREATE TABLE IF NOT EXISTS sessions (
///     id TEXT PRIMARY KEY,
///     title TEXT NOT NULL,
///     source_url TEXT NOT NULL,
///     duration_seconds INTEGER NOT NULL,
///     transcript TEXT NOT NULL,
///     summary_json TEXT NOT NULL,
///     video_url TEXT,
///     has_video INTEGER NOT NULL DEFAULT 0,
///     summary_embedding TEXT NOT NULL,
///     thumbnail_data BLOB,
///     thumbnail_mime TEXT,
///     artifact_hash TEXT,
///     created_at TEXT NOT NULL
/// )
pub fn create_sessions_table() -> String {
    Table::create()
        .table(Sessions::Table)
        .if_not_exists()
        .col(ColumnDef::new(Sessions::Id).string().primary_key())
        .col(ColumnDef::new(Sessions::Title).string().not_null())
        .col(ColumnDef::new(Sessions::SourceUrl).string().not_null())
        .col(
            ColumnDef::new(Sessions::DurationSeconds)
                .big_integer()
                .not_null(),
        )
        .col(ColumnDef::new(Sessions::Transcript).string().not_null())
        .col(ColumnDef::new(Sessions::SummaryJson).string().not_null())
        .col(ColumnDef::new(Sessions::VideoUrl).string())
        .col(
            ColumnDef::new(Sessions::HasVideo)
                .integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(Sessions::SummaryEmbedding)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(Sessions::ThumbnailData).blob())
        .col(ColumnDef::new(Sessions::ThumbnailMime).string())
        .col(ColumnDef::new(Sessions::ArtifactHash).string())
        .col(ColumnDef::new(Sessions::CreatedAt).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS suggested_tasks (
///     id TEXT PRIMARY KEY,
///     title TEXT NOT NULL,
///     description TEXT NOT NULL,
///     service TEXT,
///     action TEXT,
///     params TEXT,
///     status TEXT NOT NULL DEFAULT 'pending',
///     created_at TEXT NOT NULL,
///     updated_at TEXT,
///     source_context TEXT
/// )
pub fn create_suggested_tasks_table() -> String {
    Table::create()
        .table(SuggestedTasks::Table)
        .if_not_exists()
        .col(ColumnDef::new(SuggestedTasks::Id).string().primary_key())
        .col(ColumnDef::new(SuggestedTasks::Title).string().not_null())
        .col(
            ColumnDef::new(SuggestedTasks::Description)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(SuggestedTasks::Service).string())
        .col(ColumnDef::new(SuggestedTasks::Action).string())
        .col(ColumnDef::new(SuggestedTasks::Params).string())
        .col(
            ColumnDef::new(SuggestedTasks::Status)
                .string()
                .not_null()
                .default("pending"),
        )
        .col(ColumnDef::new(SuggestedTasks::CreatedAt).string().not_null())
        .col(ColumnDef::new(SuggestedTasks::UpdatedAt).string())
        .col(ColumnDef::new(SuggestedTasks::SourceContext).string())
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at)
pub fn create_sessions_created_at_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_sessions_created_at")
        .table(Sessions::Table)
        .col(Sessions::CreatedAt)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_sessions_artifact_hash ON sessions(artifact_hash)
pub fn create_sessions_artifact_hash_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_sessions_artifact_hash")
        .table(Sessions::Table)
        .col(Sessions::ArtifactHash)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_suggested_tasks_status ON suggested_tasks(status, created_at)
pub fn create_suggested_tasks_status_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_suggested_tasks_status")
        .table(SuggestedTasks::Table)
        .col(SuggestedTasks::Status)
        .col(SuggestedTasks::CreatedAt)
        .to_string(SqliteQueryBuilder)
}
