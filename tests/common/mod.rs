//! Shared test fixtures: a scriptable gateway and event helpers

// Not every test binary uses every fixture
#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::ws::Message;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use session_hub::error::GatewayError;
use session_hub::gateway::{
    CapabilityGateway, ChatTurn, GeminiGateway, ImageData, ResponseFormat, TextResult,
};
use session_hub::models::WorkspaceService;

/// Gateway whose answers are fixed up front. `None` in a slot makes that
/// capability fail with ModelUnavailable.
pub struct MockGateway {
    pub transcript: Option<String>,
    pub summary: Option<Value>,
    pub suggestions: Option<Value>,
    pub image: Option<(Vec<u8>, String)>,
    pub action_result: Option<Value>,
    pub image_calls: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        MockGateway {
            transcript: Some("hello world".to_string()),
            summary: Some(serde_json::json!({
                "tldr": "A short session.",
                "key_points": [],
                "action_items": [],
                "topic": "General",
                "sentiment": "Neutral",
            })),
            suggestions: Some(serde_json::json!([])),
            image: None,
            action_result: Some(serde_json::json!({"ok": true})),
            image_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CapabilityGateway for MockGateway {
    async fn ask_text(
        &self,
        _prompt: &str,
        system_prompt: Option<&str>,
        _format: ResponseFormat,
        _history: &[ChatTurn],
    ) -> Result<TextResult, GatewayError> {
        // The summarizer and the suggestion job share this capability;
        // their system prompts tell them apart
        let slot = if system_prompt.is_some_and(|p| p.contains("suggest")) {
            &self.suggestions
        } else {
            &self.summary
        };
        match slot {
            Some(value) => Ok(TextResult::Structured(value.clone())),
            None => Err(GatewayError::ModelUnavailable("mock failure".to_string())),
        }
    }

    async fn ask_multimodal(
        &self,
        _prompt: &str,
        _audio: &[u8],
        _mime_type: &str,
        _system_prompt: Option<&str>,
    ) -> Result<String, GatewayError> {
        self.transcript
            .clone()
            .ok_or_else(|| GatewayError::ModelUnavailable("mock failure".to_string()))
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        GeminiGateway::stub_embedding(text)
    }

    async fn generate_image(&self, _prompt: &str) -> Result<ImageData, GatewayError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        match &self.image {
            Some((bytes, mime_type)) => Ok(ImageData {
                bytes: bytes.clone(),
                mime_type: mime_type.clone(),
            }),
            None => Err(GatewayError::ModelUnavailable("mock failure".to_string())),
        }
    }

    async fn execute_action(
        &self,
        _service: WorkspaceService,
        _action: &str,
        _params: &Value,
    ) -> Result<Value, GatewayError> {
        self.action_result
            .clone()
            .ok_or_else(|| GatewayError::ModelUnavailable("mock failure".to_string()))
    }
}

impl MockGateway {
    pub fn into_arc(self) -> Arc<dyn CapabilityGateway> {
        Arc::new(self)
    }
}

/// Drain everything currently queued on a hub connection into parsed JSON
pub fn drain_events(rx: &mut mpsc::Receiver<Message>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            events.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    events
}

/// Events of one type, in delivery order
pub fn events_of_type<'a>(events: &'a [Value], event_type: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e["type"] == event_type)
        .collect()
}
