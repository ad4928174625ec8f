use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::EMBED_DIM;
use crate::error::TaskError;

/// Overall tone reported by the summarizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Informative,
    Educational,
    Casual,
    Professional,
    Entertainment,
    Neutral,
}

impl Sentiment {
    /// Lenient parse for summarizer output; unknown values fall back to Neutral
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "Informative" => Sentiment::Informative,
            "Educational" => Sentiment::Educational,
            "Casual" => Sentiment::Casual,
            "Professional" => Sentiment::Professional,
            "Entertainment" => Sentiment::Entertainment,
            _ => Sentiment::Neutral,
        }
    }
}

/// One action item extracted from a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    /// High | Medium | Low as produced by the summarizer
    pub priority: String,
}

/// Structured summary of a recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub tldr: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub topic: String,
    pub sentiment: Sentiment,
}

impl SessionSummary {
    /// Fallback used when the summarizer returns nothing usable
    pub fn fallback() -> Self {
        SessionSummary {
            tldr: "Session recorded but no clear summary could be generated.".to_string(),
            key_points: Vec::new(),
            action_items: Vec::new(),
            topic: "Unknown".to_string(),
            sentiment: Sentiment::Neutral,
        }
    }

    /// Coerce arbitrary summarizer JSON into the full summary shape.
    /// Missing or mistyped fields are defaulted, never left absent.
    pub fn from_value(value: &Value) -> Self {
        let fallback = Self::fallback();
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return fallback,
        };
        let tldr = obj
            .get("tldr")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fallback.tldr);
        let key_points = obj
            .get("key_points")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let action_items = obj
            .get("action_items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let task = item.get("task")?.as_str()?.to_string();
                        let priority = item
                            .get("priority")
                            .and_then(Value::as_str)
                            .unwrap_or("Medium")
                            .to_string();
                        Some(ActionItem { task, priority })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let topic = obj
            .get("topic")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fallback.topic);
        let sentiment = obj
            .get("sentiment")
            .and_then(Value::as_str)
            .map(Sentiment::parse_lenient)
            .unwrap_or(Sentiment::Neutral);
        SessionSummary {
            tldr,
            key_points,
            action_items,
            topic,
            sentiment,
        }
    }

    /// Text fed to the embedding capability
    pub fn embedding_text(&self) -> String {
        let mut text = self.tldr.clone();
        for point in &self.key_points {
            text.push('\n');
            text.push_str(point);
        }
        text
    }
}

/// Thumbnail image attached to a session (bytes travel base64-encoded on the wire)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// One recorded capture and its derived artifacts
///
/// Created in memory under a temporary uuid; the store assigns the durable
/// id on insert. Both id forms denote the same entity to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub source_url: String,
    pub duration_seconds: u64,
    pub transcript: String,
    pub summary: SessionSummary,
    pub video_url: Option<String>,
    pub has_video: bool,
    /// Retrieval-only; never serialized into API or socket payloads
    #[serde(skip_serializing, default)]
    pub summary_embedding: Vec<f32>,
    pub thumbnail: Option<Thumbnail>,
    /// Content-hash key for enrichment artifact reuse
    pub artifact_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Set or clear the video URL, keeping `has_video` consistent
    pub fn set_video_url(&mut self, video_url: Option<String>) {
        self.has_video = video_url.is_some();
        self.video_url = video_url;
    }

    /// Embedding length must always equal the fixed dimension
    pub fn embedding_is_valid(&self) -> bool {
        self.summary_embedding.len() == EMBED_DIM
    }
}

/// Integration targets a suggested task may act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceService {
    Gmail,
    Calendar,
    Tasks,
    Docs,
    Drive,
    Sheets,
}

impl WorkspaceService {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gmail" => Some(WorkspaceService::Gmail),
            "calendar" => Some(WorkspaceService::Calendar),
            "tasks" => Some(WorkspaceService::Tasks),
            "docs" => Some(WorkspaceService::Docs),
            "drive" => Some(WorkspaceService::Drive),
            "sheets" => Some(WorkspaceService::Sheets),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceService::Gmail => "gmail",
            WorkspaceService::Calendar => "calendar",
            WorkspaceService::Tasks => "tasks",
            WorkspaceService::Docs => "docs",
            WorkspaceService::Drive => "drive",
            WorkspaceService::Sheets => "sheets",
        }
    }
}

/// Lifecycle status of a suggested task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Dismissed,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "dismissed" => Some(TaskStatus::Dismissed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Dismissed)
    }

    /// Transition table: pending -> {in_progress, completed, dismissed},
    /// in_progress -> {completed, dismissed}, terminal states are final.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => next != TaskStatus::Pending,
            TaskStatus::InProgress => next.is_terminal(),
            TaskStatus::Completed | TaskStatus::Dismissed => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An actionable recommendation derived from aggregated context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedTask {
    pub id: String,
    pub title: String,
    pub description: String,
    /// None means the task is informational only
    pub service: Option<WorkspaceService>,
    /// Only meaningful paired with `service`
    pub action: Option<String>,
    /// Action-specific parameters, only meaningful paired with `service`
    pub params: Option<Value>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// What page/URL produced this suggestion
    pub source_context: Option<String>,
}

impl SuggestedTask {
    /// Shape invariant: action/params require a service
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.service.is_none() && (self.action.is_some() || self.params.is_some()) {
            return Err(TaskError::InvalidTask(
                "action/params are only allowed when a service is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a status change through the transition table
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Serde helper: Vec<u8> as a base64 string on the wire
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
