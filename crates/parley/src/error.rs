//! Error taxonomy for the backend gateway, the audio device and configuration.
//!
//! Validation failures (empty input) and empty results (silence, empty
//! transcript) are not errors here: the orchestrator reports them as
//! [`RejectReason`](crate::session::RejectReason) and
//! [`VoiceOutcome`](crate::session::VoiceOutcome) values.

use thiserror::Error;

/// Longest backend error body kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Network or backend failure on a single gateway request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("backend unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// Caller error: empty audio is never uploaded.
    #[error("refusing to upload an empty audio payload")]
    EmptyPayload,
}

impl TransportError {
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if err.is_connect() {
            Self::Unreachable {
                url: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| endpoint.to_string()),
                reason: err.to_string(),
            }
        } else if err.is_decode() {
            Self::Malformed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Request {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Build a `Status` error, preferring FastAPI's `{"detail": ...}` over the raw body.
    pub(crate) fn status(endpoint: &str, status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        Self::Status {
            endpoint: endpoint.to_string(),
            status,
            body: truncate(detail, MAX_ERROR_BODY),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Description shown to the user in an Error Turn.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreachable { .. } => {
                "I can't reach the assistant right now. Check your connection and try again."
                    .to_string()
            }
            Self::Timeout { .. } => "The assistant took too long to respond.".to_string(),
            Self::Status { status, body, .. } if body.is_empty() => {
                format!("The assistant returned an error (HTTP {status}).")
            }
            Self::Status { status, body, .. } => {
                format!("The assistant returned an error (HTTP {status}): {body}")
            }
            Self::Malformed { .. } => {
                "The assistant sent a response that couldn't be understood.".to_string()
            }
            Self::Request { reason, .. } => format!("The request failed: {reason}"),
            Self::EmptyPayload => "No audio was recorded.".to_string(),
        }
    }
}

/// Capture or playback failure on the audio device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device busy")]
    DeviceBusy,

    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("audio I/O failed: {0}")]
    Io(String),

    #[error("playback failed: {0}")]
    Playback(String),
}

impl DeviceError {
    /// Description shown to the user in an Error Turn.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Microphone access was denied. Check your system's microphone settings."
                    .to_string()
            }
            Self::DeviceBusy => "The microphone is in use by something else.".to_string(),
            Self::Unavailable(_) => "No microphone is available.".to_string(),
            Self::Io(reason) => format!("Recording failed: {reason}"),
            Self::Playback(reason) => format!("Playback failed: {reason}"),
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::NotFound => Self::Unavailable(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("{var} must be a number of seconds, got '{value}'")]
    InvalidSeconds { var: String, value: String },

    #[error("{var} must be true or false, got '{value}'")]
    InvalidBool { var: String, value: String },

    #[error("{0} must not be empty")]
    Empty(String),
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_prefers_fastapi_detail() {
        let body = r#"{"detail":"Chat processing error: boom"}"#;
        let err = TransportError::status("chat", 500, body);
        assert_eq!(
            err,
            TransportError::Status {
                endpoint: "chat".to_string(),
                status: 500,
                body: "Chat processing error: boom".to_string(),
            }
        );
    }

    #[test]
    fn status_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let TransportError::Status { body, .. } = TransportError::status("chat", 502, &body) else {
            panic!("expected status error");
        };
        assert!(body.chars().count() <= MAX_ERROR_BODY + 1);
        assert!(body.ends_with('…'));
    }

    #[test]
    fn user_messages_are_readable() {
        let err = TransportError::Timeout {
            endpoint: "chat".to_string(),
        };
        assert_eq!(err.user_message(), "The assistant took too long to respond.");

        let err = TransportError::status("chat", 503, "");
        assert_eq!(
            err.user_message(),
            "The assistant returned an error (HTTP 503)."
        );
    }

    #[test]
    fn io_errors_map_to_device_errors() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(DeviceError::from(denied), DeviceError::PermissionDenied);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(DeviceError::from(missing), DeviceError::Unavailable(_)));
    }
}
