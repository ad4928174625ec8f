//! Session processing pipeline
//!
//! transcribe -> summarize -> enrich -> persist, with live progress pushed
//! to dashboards at every stage. Events before persistence are keyed by a
//! temporary uuid; once the store assigns the durable id, a single
//! ID_UPDATE re-keys the session for observers.

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::constants::{
    NO_SPEECH_MARKER, SUPPORTED_AUDIO_MIME_TYPES, TRANSCRIPT_PREVIEW_CHARS,
};
use crate::error::PipelineError;
use crate::events::{DashboardEvent, ProgressStep};
use crate::gateway::{CapabilityGateway, ResponseFormat, TextResult};
use crate::hub::BroadcastHub;
use crate::models::{Session, SessionSummary, Thumbnail};
use crate::store::RecordStore;

const TRANSCRIBE_PROMPT: &str = "Transcribe this audio recording accurately. \
Return only the spoken words, with no commentary. If there is no speech, \
return an empty response.";

const SUMMARIZE_SYSTEM_PROMPT: &str = "You summarize transcripts of recorded \
browsing sessions. Respond with a JSON object containing: tldr (string, one \
or two sentences), key_points (array of strings), action_items (array of \
{task, priority} where priority is High, Medium or Low), topic (string), and \
sentiment (one of Informative, Educational, Casual, Professional, \
Entertainment, Neutral).";

/// Input to one pipeline run. Audio bytes are already decoded from the
/// upload body.
#[derive(Debug)]
pub struct SaveRequest {
    pub title: String,
    pub source_url: String,
    pub duration_seconds: u64,
    pub audio: Vec<u8>,
    pub mime_type: String,
    /// Set when the client already announced itself via notify_start;
    /// keeps the whole run keyed by one temporary id
    pub temporary_id: Option<String>,
    pub video_url: Option<String>,
}

/// What the synchronous save endpoint returns
#[derive(Debug, Serialize)]
pub struct SaveOutcome {
    pub success: bool,
    /// Durable id when persisted, temporary id otherwise
    pub session_id: String,
    pub persisted: bool,
    /// Truncated; the full transcript was broadcast and persisted
    pub transcript: String,
    pub summary: SessionSummary,
    pub has_video: bool,
}

pub struct SessionPipeline {
    gateway: Arc<dyn CapabilityGateway>,
    store: RecordStore,
    hub: Arc<BroadcastHub>,
}

impl SessionPipeline {
    pub fn new(
        gateway: Arc<dyn CapabilityGateway>,
        store: RecordStore,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        SessionPipeline {
            gateway,
            store,
            hub,
        }
    }

    /// Early announcement for clients that upload audio separately.
    /// Returns the temporary id the eventual save call should carry.
    pub fn announce_start(
        &self,
        title: &str,
        source_url: &str,
        duration_seconds: u64,
    ) -> String {
        let temporary_id = Uuid::new_v4().to_string();
        self.hub
            .broadcast_dashboard(&DashboardEvent::ProcessingStart {
                session_id: temporary_id.clone(),
                title: title.to_string(),
                source_url: source_url.to_string(),
                duration_seconds,
            });
        temporary_id
    }

    /// Run the full pipeline for one capture
    pub async fn process_session(&self, request: SaveRequest) -> Result<SaveOutcome, PipelineError> {
        if request.audio.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "audio payload is empty".to_string(),
            ));
        }
        if !SUPPORTED_AUDIO_MIME_TYPES.contains(&request.mime_type.as_str()) {
            return Err(PipelineError::InvalidRequest(format!(
                "unsupported audio MIME type: {}",
                request.mime_type
            )));
        }

        let temporary_id = request
            .temporary_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            "Processing session '{}' ({} bytes, {})",
            request.title,
            request.audio.len(),
            temporary_id
        );

        self.hub
            .broadcast_dashboard(&DashboardEvent::ProcessingStart {
                session_id: temporary_id.clone(),
                title: request.title.clone(),
                source_url: request.source_url.clone(),
                duration_seconds: request.duration_seconds,
            });
        self.progress(&temporary_id, 10, ProgressStep::Transcribing);

        // Stage: transcription. Failure here aborts the run.
        let transcript = match self
            .gateway
            .ask_multimodal(
                TRANSCRIBE_PROMPT,
                &request.audio,
                &request.mime_type,
                None,
            )
            .await
        {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    NO_SPEECH_MARKER.to_string()
                } else {
                    trimmed.to_string()
                }
            }
            Err(e) => {
                self.session_error(&temporary_id, &format!("Transcription failed: {}", e));
                return Err(PipelineError::Transcription(e));
            }
        };
        self.progress(&temporary_id, 50, ProgressStep::Transcribing);

        // Stage: summarization. Any usable JSON is coerced to the full
        // summary shape; a gateway failure aborts the run.
        self.progress(&temporary_id, 55, ProgressStep::Summarizing);
        let summary = match self
            .gateway
            .ask_text(
                &summarize_prompt(&request.title, &transcript),
                Some(SUMMARIZE_SYSTEM_PROMPT),
                ResponseFormat::Json,
                &[],
            )
            .await
        {
            Ok(TextResult::Structured(value)) => SessionSummary::from_value(&value),
            Ok(TextResult::Raw(_)) => {
                warn!("Summarizer ignored the JSON format, using fallback summary");
                SessionSummary::fallback()
            }
            Err(e) => {
                self.session_error(&temporary_id, &format!("Summarization failed: {}", e));
                return Err(PipelineError::Summarization(e));
            }
        };

        // Stage: enrichment, best-effort. embed() is total; the thumbnail
        // is reused from a prior session with the same content hash when
        // one exists, otherwise generated, and omitted on any failure.
        self.progress(&temporary_id, 80, ProgressStep::Enriching);
        let summary_embedding = self.gateway.embed(&summary.embedding_text()).await;
        let hash = artifact_hash(&request.title, &summary.tldr);
        let thumbnail = self.enrich_thumbnail(&request.title, &summary.tldr, &hash).await;

        let mut session = Session {
            id: temporary_id.clone(),
            title: request.title,
            source_url: request.source_url,
            duration_seconds: request.duration_seconds,
            transcript,
            summary,
            video_url: None,
            has_video: false,
            summary_embedding,
            thumbnail,
            artifact_hash: Some(hash),
            created_at: Utc::now(),
        };
        session.set_video_url(request.video_url);

        // The result reaches dashboards before persistence so a slow or
        // failing store never hides a finished session from viewers.
        self.hub
            .broadcast_dashboard(&DashboardEvent::result_for(&temporary_id, &session));
        self.progress(&temporary_id, 90, ProgressStep::Saving);

        let (session_id, persisted) = match self.store.insert_session(&session).await {
            Ok(durable_id) => {
                if durable_id != temporary_id {
                    self.hub.broadcast_dashboard(&DashboardEvent::IdUpdate {
                        temporary_id: temporary_id.clone(),
                        durable_id: durable_id.clone(),
                    });
                }
                (durable_id, true)
            }
            Err(e) => {
                // Viewers already have the result under the temporary id;
                // only the API response reports the persistence failure.
                error!("Failed to persist session {}: {}", temporary_id, e);
                (temporary_id.clone(), false)
            }
        };
        self.progress(&temporary_id, 100, ProgressStep::Complete);

        Ok(SaveOutcome {
            success: true,
            session_id,
            persisted,
            transcript: truncate_preview(&session.transcript),
            summary: session.summary,
            has_video: session.has_video,
        })
    }

    async fn enrich_thumbnail(
        &self,
        title: &str,
        tldr: &str,
        hash: &str,
    ) -> Option<Thumbnail> {
        match self.store.find_session_by_artifact_hash(hash).await {
            Ok(Some(prior)) => {
                if prior.thumbnail.is_some() {
                    info!("Reusing thumbnail from session {}", prior.id);
                    return prior.thumbnail;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Thumbnail reuse lookup failed: {}", e),
        }

        let prompt = format!(
            "A clean, minimal illustration representing: {}. {}",
            title, tldr
        );
        match self.gateway.generate_image(&prompt).await {
            Ok(image) => Some(Thumbnail {
                data: image.bytes,
                mime_type: image.mime_type,
            }),
            Err(e) => {
                warn!("Thumbnail generation failed, continuing without: {}", e);
                None
            }
        }
    }

    fn progress(&self, session_id: &str, percent: u8, step: ProgressStep) {
        self.hub.broadcast_dashboard(&DashboardEvent::Progress {
            session_id: session_id.to_string(),
            percent,
            step,
        });
    }

    fn session_error(&self, session_id: &str, message: &str) {
        error!("Session {}: {}", session_id, message);
        self.hub.broadcast_dashboard(&DashboardEvent::SessionError {
            session_id: session_id.to_string(),
            error: message.to_string(),
        });
    }
}

fn summarize_prompt(title: &str, transcript: &str) -> String {
    format!("Session title: {}\n\nTranscript:\n{}", title, transcript)
}

/// Content-hash key for enrichment artifact reuse
pub fn artifact_hash(title: &str, tldr: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(tldr.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Char-safe truncation for the synchronous response
fn truncate_preview(transcript: &str) -> String {
    transcript.chars().take(TRANSCRIPT_PREVIEW_CHARS).collect()
}
