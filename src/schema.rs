use sea_query::Iden;

/// Sessions table - one row per persisted recording with derived artifacts
#[derive(Iden)]
pub enum Sessions {
    Table,
    Id,
    Title,
    SourceUrl,
    DurationSeconds,
    Transcript,
    SummaryJson,
    VideoUrl,
    HasVideo,
    SummaryEmbedding,
    ThumbnailData,
    ThumbnailMime,
    ArtifactHash,
    CreatedAt,
}

/// Suggested tasks table - actionable recommendations for the extension
#[derive(Iden)]
pub enum SuggestedTasks {
    Table,
    Id,
    Title,
    Description,
    Service,
    Action,
    Params,
    Status,
    CreatedAt,
    UpdatedAt,
    SourceContext,
}
