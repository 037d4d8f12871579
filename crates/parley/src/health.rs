//! Connection health of the assistant backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::gateway::{Gateway, HealthReport};

/// Backend reachability as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    /// Reachable and reporting healthy
    Online,
    /// Reachable but reporting impaired health
    Degraded,
    /// Unreachable, erroring, or not checked yet
    #[default]
    Offline,
}

/// Connection state plus a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connection: Connection,
    pub detail: String,
    /// When the last check settled. `None` before the first check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::unchecked()
    }
}

impl ConnectionStatus {
    pub fn unchecked() -> Self {
        Self {
            connection: Connection::Offline,
            detail: "Checking backend connection".to_string(),
            checked_at: None,
        }
    }

    /// Map a health check result onto a connection state.
    pub fn from_check(result: Result<HealthReport, TransportError>) -> Self {
        let (connection, detail) = match result {
            Ok(report) if report.is_healthy() => {
                (Connection::Online, "Connected to assistant".to_string())
            }
            Ok(report) => {
                let impaired = report.impaired_services();
                let detail = if impaired.is_empty() {
                    format!("Backend degraded ({})", report.status)
                } else {
                    format!("Backend degraded: {} unavailable", impaired.join(", "))
                };
                (Connection::Degraded, detail)
            }
            Err(e) => (Connection::Offline, format!("Backend unreachable: {e}")),
        };

        Self {
            connection,
            detail,
            checked_at: Some(Utc::now()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.connection == Connection::Online
    }
}

/// Issue one health request and classify the outcome. Never fails: a failed
/// check is itself the `Offline` signal. No retries.
pub async fn check(gateway: &dyn Gateway) -> ConnectionStatus {
    let result = gateway.health().await;
    if let Err(ref e) = result {
        tracing::debug!(error = %e, "Health check failed");
    }
    ConnectionStatus::from_check(result)
}
