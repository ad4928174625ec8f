//! Socket event types for both broadcast channels
//!
//! Closed tagged unions: every payload that crosses the socket boundary is
//! one of these variants, with fixed fields per tag. Timestamps travel as
//! RFC 3339 strings so payloads stay fully serializable.

use serde::{Deserialize, Serialize};

use crate::models::{Session, SessionSummary, SuggestedTask, Thumbnail};
use crate::store::canonical_timestamp;

/// Pipeline stage reported in PROGRESS events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    Transcribing,
    Summarizing,
    Enriching,
    Saving,
    Complete,
}

/// Server -> dashboard events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    #[serde(rename = "PROCESSING_START")]
    ProcessingStart {
        session_id: String,
        title: String,
        source_url: String,
        duration_seconds: u64,
    },
    #[serde(rename = "PROGRESS")]
    Progress {
        session_id: String,
        percent: u8,
        step: ProgressStep,
    },
    #[serde(rename = "SESSION_RESULT")]
    SessionResult {
        /// Temporary id at this point; observers re-key on ID_UPDATE
        session_id: String,
        title: String,
        source_url: String,
        duration_seconds: u64,
        transcript: String,
        summary: SessionSummary,
        has_video: bool,
        video_url: Option<String>,
        thumbnail: Option<Thumbnail>,
        created_at: String,
    },
    #[serde(rename = "SESSION_ERROR")]
    SessionError { session_id: String, error: String },
    #[serde(rename = "ID_UPDATE")]
    IdUpdate {
        temporary_id: String,
        durable_id: String,
    },
    #[serde(rename = "TASKS_UPDATED")]
    TasksUpdated { tasks: Vec<SuggestedTask> },
    #[serde(rename = "PONG")]
    Pong { timestamp: Option<i64> },
}

impl DashboardEvent {
    /// Build the SESSION_RESULT event from an assembled session record.
    /// The embedding vector is deliberately excluded from the live payload;
    /// it exists for retrieval, not display.
    pub fn result_for(temporary_id: &str, session: &Session) -> Self {
        DashboardEvent::SessionResult {
            session_id: temporary_id.to_string(),
            title: session.title.clone(),
            source_url: session.source_url.clone(),
            duration_seconds: session.duration_seconds,
            transcript: session.transcript.clone(),
            summary: session.summary.clone(),
            has_video: session.has_video,
            video_url: session.video_url.clone(),
            thumbnail: session.thumbnail.clone(),
            created_at: canonical_timestamp(session.created_at),
        }
    }
}

/// Server -> extension events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtensionEvent {
    #[serde(rename = "SYNCED_TASKS")]
    SyncedTasks { tasks: Vec<SuggestedTask> },
    #[serde(rename = "PONG")]
    Pong { timestamp: Option<i64> },
}

/// Client -> server messages, shared by both channels
/// (REQUEST_TASKS is only honored on the extension channel)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping { timestamp: Option<i64> },
    #[serde(rename = "REQUEST_TASKS")]
    RequestTasks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DashboardEvent::Progress {
            session_id: "tmp-1".to_string(),
            percent: 55,
            step: ProgressStep::Summarizing,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PROGRESS");
        assert_eq!(json["percent"], 55);
        assert_eq!(json["step"], "summarizing");
    }

    #[test]
    fn session_result_uses_the_canonical_timestamp_form() {
        use crate::constants::EMBED_DIM;
        use chrono::Utc;

        let session = Session {
            id: "s_abc".to_string(),
            title: "Standup".to_string(),
            source_url: "https://meet.example".to_string(),
            duration_seconds: 60,
            transcript: "words".to_string(),
            summary: SessionSummary::fallback(),
            video_url: None,
            has_video: false,
            summary_embedding: vec![0.0; EMBED_DIM],
            thumbnail: None,
            artifact_hash: None,
            created_at: Utc::now(),
        };
        let event = DashboardEvent::result_for("tmp-1", &session);
        let json = serde_json::to_value(&event).unwrap();
        // Same fixed-width micros form as the persisted rows
        assert_eq!(
            json["created_at"],
            canonical_timestamp(session.created_at)
        );
        assert!(json["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn client_messages_parse_from_wire_form() {
        let ping: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","timestamp":123}"#).unwrap();
        assert!(matches!(
            ping,
            ClientMessage::Ping {
                timestamp: Some(123)
            }
        ));
        let req: ClientMessage = serde_json::from_str(r#"{"type":"REQUEST_TASKS"}"#).unwrap();
        assert!(matches!(req, ClientMessage::RequestTasks));
    }
}
