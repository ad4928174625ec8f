//! Capability gateway
//!
//! Single abstraction point for "call the language model" and "call a
//! Workspace action". Every failure is decoded here into a typed
//! [`GatewayError`]; nothing downstream parses error strings.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::warn;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::EMBED_DIM;
use crate::error::GatewayError;
use crate::models::WorkspaceService;

/// Default text/multimodal model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const EMBED_MODEL: &str = "text-embedding-004";
const IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Per-request timeout, also the pipeline's defensive per-stage bound
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const EMBED_TIMEOUT: Duration = Duration::from_secs(15);

/// Calls past this threshold are logged loudly (quota protection)
const CALL_WARN_THRESHOLD: u64 = 20;

/// Requested shape of a text response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

/// One prior turn of a multi-turn exchange
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Text capability result: structured JSON when the model honored the
/// requested format, raw text otherwise
#[derive(Debug, Clone)]
pub enum TextResult {
    Structured(Value),
    Raw(String),
}

/// Generated image bytes plus MIME type
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Process-scoped API call counter, injected into the gateway at startup
#[derive(Debug, Default)]
pub struct CallCounter {
    calls: AtomicU64,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outbound call, warning past the threshold
    pub fn record(&self) -> u64 {
        let count = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if count > CALL_WARN_THRESHOLD {
            warn!("API call count exceeded {} (current: {})", CALL_WARN_THRESHOLD, count);
        }
        count
    }

    pub fn total(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

/// The capability surface consumed by the pipeline and the suggestion job
#[async_trait]
pub trait CapabilityGateway: Send + Sync {
    /// Text-structuring capability
    async fn ask_text(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        format: ResponseFormat,
        history: &[ChatTurn],
    ) -> Result<TextResult, GatewayError>;

    /// Audio transcription capability
    async fn ask_multimodal(
        &self,
        prompt: &str,
        audio: &[u8],
        mime_type: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, GatewayError>;

    /// Embedding capability. Total: falls back to a deterministic
    /// pseudo-embedding on any error, so callers never handle failure.
    async fn embed(&self, text: &str) -> Vec<f32>;

    /// Thumbnail/image generation capability
    async fn generate_image(&self, prompt: &str) -> Result<ImageData, GatewayError>;

    /// Workspace action capability (gmail/calendar/... integrations)
    async fn execute_action(
        &self,
        service: WorkspaceService,
        action: &str,
        params: &Value,
    ) -> Result<Value, GatewayError>;
}

/// Production gateway over the Gemini HTTP API
pub struct GeminiGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    /// Optional HTTP endpoint that executes Workspace actions
    workspace_url: Option<String>,
    counter: Arc<CallCounter>,
}

impl GeminiGateway {
    pub fn new(
        api_key: String,
        model: Option<String>,
        workspace_url: Option<String>,
        counter: Arc<CallCounter>,
    ) -> Self {
        GeminiGateway {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            workspace_url,
            counter,
        }
    }

    /// Point the gateway at a different API host (tests use a local stub)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// POST a generateContent request and return the first text part
    async fn generate_content(
        &self,
        model: &str,
        parts: Value,
        system_prompt: Option<&str>,
        response_mime_type: &str,
        history: &[ChatTurn],
    ) -> Result<String, GatewayError> {
        self.counter.record();

        let mut contents: Vec<Value> = history
            .iter()
            .filter(|turn| !turn.text.is_empty())
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": turn.text}]})
            })
            .collect();
        contents.push(json!({"role": "user", "parts": parts}));

        let mut payload = json!({
            "contents": contents,
            "generationConfig": {"responseMimeType": response_mime_type},
        });
        if let Some(system_prompt) = system_prompt {
            payload["systemInstruction"] = json!({
                "role": "system",
                "parts": [{"text": system_prompt}],
            });
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::ModelUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        extract_first_text(&data)
    }

    /// Deterministic fallback when no embedding service responds
    pub fn stub_embedding(text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return vec![0.0; EMBED_DIM];
        }
        let digest = Sha256::digest(text.as_bytes());
        let seed = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (0..EMBED_DIM)
            .map(|i| ((seed.wrapping_add(i as u32)) % 1000) as f32 / 1000.0 - 0.5)
            .collect()
    }
}

#[async_trait]
impl CapabilityGateway for GeminiGateway {
    async fn ask_text(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        format: ResponseFormat,
        history: &[ChatTurn],
    ) -> Result<TextResult, GatewayError> {
        let mime = match format {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Text => "text/plain",
        };
        let text = self
            .generate_content(
                &self.model,
                json!([{"text": prompt}]),
                system_prompt,
                mime,
                history,
            )
            .await?;
        match format {
            ResponseFormat::Json => match serde_json::from_str::<Value>(&text) {
                Ok(value) => Ok(TextResult::Structured(value)),
                Err(_) => Ok(TextResult::Raw(text)),
            },
            ResponseFormat::Text => Ok(TextResult::Raw(text)),
        }
    }

    async fn ask_multimodal(
        &self,
        prompt: &str,
        audio: &[u8],
        mime_type: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, GatewayError> {
        let parts = json!([
            {"text": prompt},
            {"inlineData": {"mimeType": mime_type, "data": BASE64.encode(audio)}},
        ]);
        self.generate_content(&self.model, parts, system_prompt, "text/plain", &[])
            .await
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return vec![0.0; EMBED_DIM];
        }

        self.counter.record();
        let truncated: String = text.chars().take(8000).collect();
        let payload = json!({
            "content": {"parts": [{"text": truncated}]},
            "taskType": "RETRIEVAL_DOCUMENT",
        });
        let url = format!("{}/models/{}:embedContent", self.base_url, EMBED_MODEL);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(EMBED_TIMEOUT)
            .send()
            .await;

        let values = match response {
            Ok(response) if response.status().is_success() => response
                .json::<Value>()
                .await
                .ok()
                .and_then(|data| {
                    data.get("embedding")
                        .and_then(|e| e.get("values"))
                        .and_then(Value::as_array)
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(Value::as_f64)
                                .map(|v| v as f32)
                                .collect::<Vec<f32>>()
                        })
                })
                .filter(|v| v.len() == EMBED_DIM),
            _ => None,
        };

        match values {
            Some(values) => values,
            None => Self::stub_embedding(text),
        }
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageData, GatewayError> {
        self.counter.record();

        let payload = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseModalities": ["IMAGE"]},
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, IMAGE_MODEL);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::ModelUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        extract_first_inline_image(&data)
    }

    async fn execute_action(
        &self,
        service: WorkspaceService,
        action: &str,
        params: &Value,
    ) -> Result<Value, GatewayError> {
        let workspace_url = self.workspace_url.as_ref().ok_or_else(|| {
            GatewayError::ModelUnavailable("no workspace endpoint configured".to_string())
        })?;

        self.counter.record();
        let payload = json!({
            "service": service.as_str(),
            "action": action,
            "params": params,
        });
        let response = self
            .http
            .post(workspace_url)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::ModelUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), &body));
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }
}

/// Map an HTTP failure status to the error taxonomy
fn classify_http_failure(status: u16, body: &str) -> GatewayError {
    let lowered = body.to_lowercase();
    if status == 429 || lowered.contains("resource_exhausted") || lowered.contains("quota") {
        return GatewayError::QuotaExceeded(format!("HTTP {}: {}", status, truncate(body, 200)));
    }
    if status >= 500 {
        return GatewayError::ModelUnavailable(format!("HTTP {}: {}", status, truncate(body, 200)));
    }
    GatewayError::MalformedResponse(format!("HTTP {}: {}", status, truncate(body, 200)))
}

/// First text part of the first candidate
fn extract_first_text(data: &Value) -> Result<String, GatewayError> {
    let parts = data
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GatewayError::MalformedResponse("no candidates in response".to_string())
        })?;
    parts
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| GatewayError::MalformedResponse("no text part in response".to_string()))
}

/// First inlineData image part of the first candidate
fn extract_first_inline_image(data: &Value) -> Result<ImageData, GatewayError> {
    let parts = data
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GatewayError::MalformedResponse("no candidates in response".to_string())
        })?;
    for part in parts {
        if let Some(inline) = part.get("inlineData") {
            let mime_type = inline
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            let encoded = inline.get("data").and_then(Value::as_str).ok_or_else(|| {
                GatewayError::MalformedResponse("inlineData without data".to_string())
            })?;
            let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| {
                GatewayError::MalformedResponse(format!("bad inline image data: {}", e))
            })?;
            return Ok(ImageData { bytes, mime_type });
        }
    }
    Err(GatewayError::MalformedResponse(
        "no image part in response".to_string(),
    ))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedding = GeminiGateway::stub_embedding("");
        assert_eq!(embedding.len(), EMBED_DIM);
        assert!(embedding.iter().all(|v| *v == 0.0));
        let whitespace = GeminiGateway::stub_embedding("   ");
        assert!(whitespace.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn stub_embedding_is_deterministic() {
        let a = GeminiGateway::stub_embedding("roadmap discussion");
        let b = GeminiGateway::stub_embedding("roadmap discussion");
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBED_DIM);
        let other = GeminiGateway::stub_embedding("different text");
        assert_ne!(a, other);
    }

    #[test]
    fn quota_failures_classify_as_quota_exceeded() {
        let err = classify_http_failure(429, "Too Many Requests");
        assert!(matches!(err, GatewayError::QuotaExceeded(_)));
        let err = classify_http_failure(403, r#"{"status":"RESOURCE_EXHAUSTED"}"#);
        assert!(matches!(err, GatewayError::QuotaExceeded(_)));
        let err = classify_http_failure(503, "overloaded");
        assert!(matches!(err, GatewayError::ModelUnavailable(_)));
        let err = classify_http_failure(400, "bad request");
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn call_counter_counts() {
        let counter = CallCounter::new();
        counter.record();
        counter.record();
        assert_eq!(counter.total(), 2);
    }
}
