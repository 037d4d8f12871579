//! Periodic connection checks.
//!
//! The session checks health once when it starts; hosts that want a live
//! indicator run this poller alongside it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::SessionOrchestrator;

/// Used in place of a zero interval, which tokio refuses.
const FALLBACK_INTERVAL: Duration = Duration::from_millis(100);

/// Re-check the connection every `interval` until `cancel` fires.
///
/// The first check happens one interval after spawning. Checks never
/// overlap: a slow check delays the next one instead of stacking up.
pub fn spawn_health_poller(
    session: Arc<SessionOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = if interval.is_zero() {
        tracing::warn!(
            fallback_ms = u64::try_from(FALLBACK_INTERVAL.as_millis()).unwrap_or(u64::MAX),
            "Zero health interval, using fallback"
        );
        FALLBACK_INTERVAL
    } else {
        interval
    };

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(interval_ms, "Health poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let status = session.check_connection().await;
                    tracing::trace!(connection = ?status.connection, "Health poll");
                }
            }
        }
        tracing::debug!("Health poller stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::ClientConfig;
    use crate::device::AudioDevice;
    use crate::device::tests::{MockBackend, wait_for};
    use crate::error::TransportError;
    use crate::gateway::{ChatReply, ChatRequest, Gateway, HealthReport, Transcript};
    use crate::health::Connection;
    use crate::turn::AudioRef;

    /// Healthy on the first check, unreachable afterwards.
    #[derive(Default)]
    struct FlakyHealth {
        checks: AtomicUsize,
    }

    #[async_trait]
    impl Gateway for FlakyHealth {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatReply, TransportError> {
            Ok(ChatReply::new("ok"))
        }

        async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript, TransportError> {
            Ok(Transcript::new(""))
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
        ) -> Result<AudioRef, TransportError> {
            Err(TransportError::EmptyPayload)
        }

        async fn health(&self) -> Result<HealthReport, TransportError> {
            if self.checks.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(HealthReport::healthy())
            } else {
                Err(TransportError::Timeout {
                    endpoint: "health".to_string(),
                })
            }
        }

        async fn history(
            &self,
            _user_id: &str,
            _limit: Option<usize>,
        ) -> Result<Vec<serde_json::Value>, TransportError> {
            Ok(Vec::new())
        }

        async fn clear_history(&self, _user_id: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    async fn session_for(
        gateway: &Arc<FlakyHealth>,
        config: ClientConfig,
    ) -> Arc<SessionOrchestrator> {
        let device = Arc::new(AudioDevice::new(Arc::new(MockBackend::default())));
        Arc::new(
            SessionOrchestrator::start(config, Arc::clone(gateway) as Arc<dyn Gateway>, device)
                .await,
        )
    }

    #[tokio::test]
    async fn poller_updates_connection_until_cancelled() {
        let gateway = Arc::new(FlakyHealth::default());
        let config = ClientConfig::default().with_health_interval(Duration::from_millis(10));
        let session = session_for(&gateway, config).await;
        assert_eq!(session.state().connection, Connection::Online);

        let cancel = CancellationToken::new();
        let handle = spawn_health_poller(
            Arc::clone(&session),
            session.config().health_interval,
            cancel.clone(),
        );

        wait_for(|| gateway.checks.load(Ordering::SeqCst) >= 3).await;
        assert_eq!(session.state().connection, Connection::Offline);

        cancel.cancel();
        handle.await.unwrap();

        let settled = gateway.checks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gateway.checks.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn zero_interval_falls_back_instead_of_panicking() {
        let gateway = Arc::new(FlakyHealth::default());
        let session = session_for(&gateway, ClientConfig::default()).await;

        let cancel = CancellationToken::new();
        let handle = spawn_health_poller(Arc::clone(&session), Duration::ZERO, cancel.clone());

        wait_for(|| gateway.checks.load(Ordering::SeqCst) >= 2).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }
}
