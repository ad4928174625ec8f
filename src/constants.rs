use rand::Rng;

/// Dimension of the summary embedding vector
/// All stored embeddings must have exactly this length
pub const EMBED_DIM: usize = 768;

/// Marker stored in place of an empty transcription result
/// An empty-string transcript is never persisted or broadcast
pub const NO_SPEECH_MARKER: &str = "[No speech detected in recording]";

/// Maximum transcript length returned in the synchronous save response
/// The full transcript is still persisted and broadcast
pub const TRANSCRIPT_PREVIEW_CHARS: usize = 500;

/// Maximum number of tasks pushed to extension clients in one SYNCED_TASKS payload
pub const TASK_SYNC_LIMIT: u64 = 10;

/// Audio MIME types accepted by the session pipeline
pub const SUPPORTED_AUDIO_MIME_TYPES: &[&str] = &[
    "audio/webm",
    "audio/ogg",
    "audio/mp4",
    "audio/mpeg",
    "audio/wav",
];

/// Generate a durable record id for a collection
/// Used by the store when inserting new records; the prefix keeps
/// session and task ids distinguishable in logs
pub fn generate_record_id(prefix: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(12)
            .map(char::from)
            .collect::<String>()
    )
}
