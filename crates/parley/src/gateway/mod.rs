//! Transport gateway to the assistant backend.
//!
//! Every operation is a single request/response. Retries and polling belong
//! to callers; timeouts surface as ordinary [`TransportError`]s.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::turn::AudioRef;

pub use http::HttpGateway;

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub voice_enabled: bool,
}

/// Reply from `POST /chat`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Backend clock, as sent. The log assigns its own timestamps.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub clarification_needed: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub suggestions: Vec<String>,
}

impl ChatReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio_url: None,
            timestamp: None,
            emotion: None,
            clarification_needed: false,
            suggestions: Vec::new(),
        }
    }

    pub fn with_audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    /// Speech for this reply, if the backend produced any.
    pub fn audio_ref(&self) -> Option<AudioRef> {
        self.audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(AudioRef::new)
    }
}

/// Reply from `POST /transcribe`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transcript {
    #[serde(rename = "transcript")]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub needs_clarification: bool,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            needs_clarification: false,
        }
    }

    /// No speech was recognised.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Reply from `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// Per-service readiness, when the backend reports it.
    #[serde(default)]
    pub services: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            services: BTreeMap::new(),
        }
    }

    pub fn unhealthy(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            services: BTreeMap::new(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    /// Services the backend reports as not ready.
    pub fn impaired_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, ready)| !**ready)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Backend operations consumed by the session orchestrator.
///
/// This abstraction enables testing the orchestrator without a backend.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, TransportError>;

    /// Upload recorded audio. Empty input is a caller error and is not sent.
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript, TransportError>;

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioRef, TransportError>;

    /// Fails only when the backend cannot be reached or answers garbage.
    async fn health(&self) -> Result<HealthReport, TransportError>;

    /// Server-side conversation history for `user_id`, oldest first. `None`
    /// leaves the limit to the backend.
    async fn history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, TransportError>;

    async fn clear_history(&self, user_id: &str) -> Result<(), TransportError>;
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
