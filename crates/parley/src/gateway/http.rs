//! HTTP gateway against the assistant backend's REST API.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{ChatReply, ChatRequest, Gateway, HealthReport, Transcript};
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::turn::AudioRef;
use crate::version::VersionInfo;

const CHAT: &str = "chat";
const TRANSCRIBE: &str = "transcribe";
const SYNTHESIZE: &str = "synthesize";
const HEALTH: &str = "health";
const CONVERSATION: &str = "conversation";

/// Multipart field the backend reads the recording from.
const AUDIO_FIELD: &str = "audio_file";

#[derive(Deserialize)]
struct SynthesizeReply {
    audio_url: String,
}

#[derive(Deserialize)]
struct HistoryReply {
    #[serde(default)]
    history: Vec<serde_json::Value>,
}

pub struct HttpGateway {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig, version: &VersionInfo) -> Result<Self, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref token) = config.auth_token
            && let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
        {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        if let Ok(value) = reqwest::header::HeaderValue::from_str(&version.user_agent()) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Request {
                endpoint: config.base_url.to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Request {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// `conversation/{user_id}` with the id escaped as a single path segment.
    fn conversation_url(&self, user_id: &str) -> Result<Url, TransportError> {
        let mut url = self.endpoint(CONVERSATION)?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Request {
                endpoint: CONVERSATION.to_string(),
                reason: "base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push(user_id);
        Ok(url)
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(endpoint, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(endpoint, status = %status, "Backend returned error status");
        Err(TransportError::status(endpoint, status.as_u16(), &body))
    }

    async fn decode<R: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<R, TransportError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(endpoint, e))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let url = self.endpoint(CHAT)?;
        let response = self.send(CHAT, self.client.post(url).json(request)).await?;
        Self::decode(CHAT, response).await
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript, TransportError> {
        if audio.is_empty() {
            return Err(TransportError::EmptyPayload);
        }

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| TransportError::from_reqwest(TRANSCRIBE, e))?;
        let form = reqwest::multipart::Form::new().part(AUDIO_FIELD, part);

        let url = self.endpoint(TRANSCRIBE)?;
        tracing::debug!(bytes = audio.len(), "Uploading recording for transcription");
        let response = self
            .send(TRANSCRIBE, self.client.post(url).multipart(form))
            .await?;
        Self::decode(TRANSCRIBE, response).await
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioRef, TransportError> {
        let url = self.endpoint(SYNTHESIZE)?;
        let body = serde_json::json!({ "text": text, "voice_id": voice_id });
        let response = self
            .send(SYNTHESIZE, self.client.post(url).json(&body))
            .await?;
        let reply: SynthesizeReply = Self::decode(SYNTHESIZE, response).await?;

        if reply.audio_url.trim().is_empty() {
            return Err(TransportError::Malformed {
                endpoint: SYNTHESIZE.to_string(),
                reason: "empty audio_url".to_string(),
            });
        }
        Ok(AudioRef::new(reply.audio_url))
    }

    async fn health(&self) -> Result<HealthReport, TransportError> {
        let url = self.endpoint(HEALTH)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(HEALTH, e))?;

        let status = response.status();
        if status.is_success() {
            return Self::decode(HEALTH, response).await;
        }

        // Reachable but failing: report it as unhealthy rather than unreachable.
        let body = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<HealthReport>(&body)
            .unwrap_or_else(|_| HealthReport::unhealthy(format!("HTTP {}", status.as_u16()))))
    }

    async fn history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, TransportError> {
        let url = self.conversation_url(user_id)?;
        let mut request = self.client.get(url);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = self.send(CONVERSATION, request).await?;
        let reply: HistoryReply = Self::decode(CONVERSATION, response).await?;
        Ok(reply.history)
    }

    async fn clear_history(&self, user_id: &str) -> Result<(), TransportError> {
        let url = self.conversation_url(user_id)?;
        self.send(CONVERSATION, self.client.delete(url)).await?;
        Ok(())
    }
}
