//! Session orchestrator: owns the conversation log and the turn/voice state
//! machine, and is the only writer of either.
//!
//! Admission is decided under one lock: at most one send or transcription is
//! in flight, and none is admitted while the microphone is open or changing
//! state. Replies are appended in settlement order, then narration (if any)
//! is started without holding the turn open.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{broadcast, watch};

use crate::config::ClientConfig;
use crate::conversation::ConversationLog;
use crate::device::AudioDevice;
use crate::error::{DeviceError, TransportError};
use crate::gateway::{ChatRequest, Gateway};
use crate::health::{self, ConnectionStatus};
use crate::session::{
    CaptureOutcome, Phase, RejectReason, SendOutcome, SessionEvent, SessionState, VoiceOutcome,
};
use crate::turn::{AudioRef, NewTurn, Turn};

const EVENT_CAPACITY: usize = 64;

struct Inner {
    phase: Phase,
    /// Microphone is being opened or closed.
    capture_transition: bool,
    log: ConversationLog,
    connection: ConnectionStatus,
}

impl Inner {
    fn admission_blocker(&self) -> Option<RejectReason> {
        if self.capture_transition {
            return Some(RejectReason::CaptureTransition);
        }
        match self.phase {
            Phase::Idle => None,
            Phase::Sending | Phase::Transcribing => Some(RejectReason::TurnInFlight),
            Phase::Recording => Some(RejectReason::Recording),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::derive(self.phase, &self.connection, self.log.len())
    }
}

pub struct SessionOrchestrator {
    config: ClientConfig,
    gateway: Arc<dyn Gateway>,
    device: Arc<AudioDevice>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Holds the admission gate for one operation.
///
/// If the operation's future is dropped before it settles, the drop returns
/// the session to Idle and closes the microphone if it was left open.
struct Admission<'a> {
    session: &'a SessionOrchestrator,
    armed: bool,
}

impl<'a> Admission<'a> {
    fn new(session: &'a SessionOrchestrator) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    /// Must be called with the session lock held or after the final state
    /// has been published.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let releasing_capture = {
            let mut inner = self.session.lock();
            let releasing = inner.capture_transition || inner.phase == Phase::Recording;
            tracing::warn!(phase = ?inner.phase, "Operation abandoned before settling");
            inner.capture_transition = false;
            inner.phase = Phase::Idle;
            self.session.publish(&inner, None);
            releasing
        };

        if releasing_capture {
            self.session.release_microphone_in_background();
        }
    }
}

impl SessionOrchestrator {
    /// Build a session and issue the initial health check.
    pub async fn start(
        config: ClientConfig,
        gateway: Arc<dyn Gateway>,
        device: Arc<AudioDevice>,
    ) -> Self {
        let session = Self::new(config, gateway, device);
        session.check_connection().await;
        session
    }

    fn new(config: ClientConfig, gateway: Arc<dyn Gateway>, device: Arc<AudioDevice>) -> Self {
        let inner = Inner {
            phase: Phase::Idle,
            capture_transition: false,
            log: ConversationLog::new(),
            connection: ConnectionStatus::unchecked(),
        };
        let (state_tx, _) = watch::channel(inner.state());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            gateway,
            device,
            inner: Mutex::new(inner),
            state_tx,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Session mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, inner: &Inner, event: Option<SessionEvent>) {
        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        let state = inner.state();
        self.state_tx.send_replace(state.clone());
        let _ = self.events.send(SessionEvent::StateChanged(state));
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the log in append order.
    pub fn turns(&self) -> Vec<Turn> {
        self.lock().log.turns().to_vec()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.lock().connection.clone()
    }

    // ========================================================================
    // Text turns
    // ========================================================================

    pub async fn send_text(&self, text: &str) -> SendOutcome {
        self.send_text_with_context(text, None).await
    }

    /// Send `text` with optional structured context for the backend.
    ///
    /// Rejected (no state change, no request) when the text is blank or
    /// another operation holds the session.
    pub async fn send_text_with_context(
        &self,
        text: &str,
        context: Option<serde_json::Value>,
    ) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Rejected(RejectReason::EmptyInput);
        }

        let admission = {
            let mut inner = self.lock();
            if let Some(reason) = inner.admission_blocker() {
                tracing::debug!(%reason, "Send rejected");
                return SendOutcome::Rejected(reason);
            }
            inner.phase = Phase::Sending;
            let turn = inner.log.append(NewTurn::user(text));
            self.publish(&inner, Some(SessionEvent::TurnAppended(turn)));
            Admission::new(self)
        };

        self.converse(text.to_string(), context, admission).await
    }

    async fn converse(
        &self,
        message: String,
        context: Option<serde_json::Value>,
        admission: Admission<'_>,
    ) -> SendOutcome {
        let request = ChatRequest {
            message,
            user_id: self.config.user_id.clone(),
            context,
            voice_enabled: self.config.voice_enabled,
        };

        let started = Instant::now();
        let result = self.gateway.chat(&request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(reply) => {
                tracing::info!(
                    elapsed_ms,
                    has_audio = reply.audio_ref().is_some(),
                    "Assistant replied"
                );
                let turn = self.settle(admission, NewTurn::from_reply(reply));
                if let Some(audio) = turn.audio_ref() {
                    self.narrate(audio.clone());
                }
                SendOutcome::Replied(turn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Chat request failed");
                SendOutcome::Failed(self.settle(admission, NewTurn::error(e.user_message())))
            }
        }
    }

    /// Append the settling turn and return to Idle as one step.
    fn settle(&self, admission: Admission<'_>, turn: NewTurn) -> Turn {
        let mut inner = self.lock();
        let turn = inner.log.append(turn);
        inner.phase = Phase::Idle;
        inner.capture_transition = false;
        self.publish(&inner, Some(SessionEvent::TurnAppended(turn.clone())));
        admission.disarm();
        turn
    }

    /// Return to Idle without appending anything.
    fn release(&self, admission: Admission<'_>) {
        let mut inner = self.lock();
        inner.phase = Phase::Idle;
        inner.capture_transition = false;
        self.publish(&inner, None);
        admission.disarm();
    }

    // ========================================================================
    // Voice turns
    // ========================================================================

    /// Open the microphone.
    ///
    /// A device failure leaves the session unchanged and is returned to the
    /// caller; nothing is appended to the log.
    pub async fn start_voice_capture(&self) -> Result<CaptureOutcome, DeviceError> {
        let admission = {
            let mut inner = self.lock();
            if let Some(reason) = inner.admission_blocker() {
                tracing::debug!(%reason, "Capture start rejected");
                return Ok(CaptureOutcome::Rejected(reason));
            }
            inner.capture_transition = true;
            Admission::new(self)
        };

        let result = self.device.start_capture().await;

        let mut inner = self.lock();
        inner.capture_transition = false;
        match result {
            Ok(()) => {
                inner.phase = Phase::Recording;
                self.publish(&inner, None);
                admission.disarm();
                tracing::info!("Recording started");
                Ok(CaptureOutcome::Started)
            }
            Err(e) => {
                admission.disarm();
                tracing::warn!(error = %e, "Could not start recording");
                Err(e)
            }
        }
    }

    /// Close the microphone and turn the recording into a text turn.
    ///
    /// Empty recordings and empty transcripts are discarded silently.
    /// Device and transcription failures append an Error turn.
    pub async fn stop_voice_capture(&self) -> VoiceOutcome {
        let admission = {
            let mut inner = self.lock();
            if inner.capture_transition {
                return VoiceOutcome::Rejected(RejectReason::CaptureTransition);
            }
            if inner.phase != Phase::Recording {
                return VoiceOutcome::Rejected(RejectReason::NotRecording);
            }
            // The recording is committed to a turn from here on.
            inner.capture_transition = true;
            inner.phase = Phase::Transcribing;
            self.publish(&inner, None);
            Admission::new(self)
        };

        let audio = match self.device.stop_capture().await {
            Ok(bytes) if bytes.is_empty() => {
                tracing::info!("Recording was empty, discarding");
                self.release(admission);
                return VoiceOutcome::NoAudio;
            }
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Could not stop recording");
                let turn = self.settle(admission, NewTurn::error(e.user_message()));
                return VoiceOutcome::Failed(turn);
            }
        };

        self.lock().capture_transition = false;

        let transcript = match self.gateway.transcribe(&audio).await {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(error = %e, bytes = audio.len(), "Transcription failed");
                let description = format!("I couldn't transcribe that. {}", e.user_message());
                return VoiceOutcome::Failed(self.settle(admission, NewTurn::error(description)));
            }
        };

        if transcript.is_empty() {
            tracing::info!("No speech recognised, discarding recording");
            self.release(admission);
            return VoiceOutcome::NoSpeech;
        }

        let text = transcript.text.trim().to_string();
        tracing::debug!(confidence = ?transcript.confidence, "Transcript received");
        {
            let mut inner = self.lock();
            inner.phase = Phase::Sending;
            let turn = inner.log.append(NewTurn::user(text.clone()));
            self.publish(&inner, Some(SessionEvent::TurnAppended(turn)));
        }

        self.converse(text, None, admission).await.into()
    }

    fn release_microphone_in_background(&self) {
        let device = Arc::clone(&self.device);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = device.stop_capture().await {
                        tracing::warn!(error = %e, "Failed to release microphone");
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime available to release microphone"),
        }
    }

    // ========================================================================
    // Narration
    // ========================================================================

    /// Narrate `audio` in the background. Playback settlement is reported as
    /// a separate event and never affects the turn that produced it.
    fn narrate(&self, audio: AudioRef) {
        let device = Arc::clone(&self.device);
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(SessionEvent::PlaybackStarted(audio.clone()));
            let result = device.play(&audio).await;
            if let Err(ref e) = result {
                tracing::warn!(audio = %audio, error = %e, "Playback failed");
            }
            let _ = events.send(SessionEvent::PlaybackSettled {
                audio_ref: audio,
                result,
            });
        });
    }

    /// Narrate a turn, synthesizing speech first when it carries no audio.
    pub async fn speak(&self, turn: &Turn) -> Result<AudioRef, TransportError> {
        let audio = match turn.audio_ref() {
            Some(audio) => audio.clone(),
            None => {
                self.gateway
                    .synthesize(turn.text(), &self.config.voice_id)
                    .await?
            }
        };
        self.narrate(audio.clone());
        Ok(audio)
    }

    pub async fn stop_narration(&self) {
        self.device.stop_playback().await;
    }

    // ========================================================================
    // Log and backend history
    // ========================================================================

    /// Empty the local log. A reply still in flight is appended when it
    /// settles.
    pub fn clear_conversation(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.log.clear();
        tracing::info!(
            removed,
            turn_in_flight = inner.phase.turn_in_flight(),
            "Conversation cleared"
        );
        self.publish(&inner, Some(SessionEvent::LogCleared));
        removed
    }

    /// Conversation history the backend keeps for this user.
    pub async fn remote_history(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, TransportError> {
        self.gateway.history(&self.config.user_id, limit).await
    }

    pub async fn clear_remote_history(&self) -> Result<(), TransportError> {
        self.gateway.clear_history(&self.config.user_id).await?;
        tracing::info!(user_id = %self.config.user_id, "Backend history cleared");
        Ok(())
    }

    // ========================================================================
    // Connection health
    // ========================================================================

    /// Check backend health once and publish the result.
    pub async fn check_connection(&self) -> ConnectionStatus {
        let status = health::check(self.gateway.as_ref()).await;

        let mut inner = self.lock();
        if inner.connection.connection != status.connection {
            tracing::info!(
                from = ?inner.connection.connection,
                to = ?status.connection,
                detail = %status.detail,
                "Connection changed"
            );
        }
        inner.connection = status.clone();
        self.publish(&inner, None);
        status
    }
}
