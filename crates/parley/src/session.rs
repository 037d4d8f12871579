//! Observable session state, events and operation outcomes.

use serde::Serialize;

use crate::error::DeviceError;
use crate::health::{Connection, ConnectionStatus};
use crate::turn::{AudioRef, Turn};

/// Turn/voice state machine position.
///
/// ```text
/// Idle ──send_text──────────▶ Sending ──reply or failure──▶ Idle
/// Idle ──start_voice_capture▶ Recording
/// Recording ──stop_voice_capture──▶ Transcribing ──transcript──▶ Sending
/// Transcribing ──no audio, empty or failed──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    Recording,
    Transcribing,
}

impl Phase {
    /// A send has been admitted and has not settled.
    pub fn turn_in_flight(self) -> bool {
        matches!(self, Self::Sending | Self::Transcribing)
    }

    pub fn is_recording(self) -> bool {
        self == Self::Recording
    }
}

/// Snapshot handed to presentation layers.
///
/// Once `stop_voice_capture` is admitted the phase is `Transcribing`, even
/// while the microphone is still closing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub turn_in_flight: bool,
    pub recording: bool,
    pub connection: Connection,
    pub connection_detail: String,
    pub turn_count: usize,
}

impl SessionState {
    pub(crate) fn derive(phase: Phase, connection: &ConnectionStatus, turn_count: usize) -> Self {
        Self {
            phase,
            turn_in_flight: phase.turn_in_flight(),
            recording: phase.is_recording(),
            connection: connection.connection,
            connection_detail: connection.detail.clone(),
            turn_count,
        }
    }
}

/// Why an operation was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Input was empty after trimming.
    EmptyInput,
    /// A send or transcription has not settled yet.
    TurnInFlight,
    /// The microphone is open.
    Recording,
    /// The microphone is being opened or closed.
    CaptureTransition,
    /// `stop_voice_capture` without an open microphone.
    NotRecording,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::EmptyInput => "nothing to send",
            Self::TurnInFlight => "still waiting for the previous reply",
            Self::Recording => "recording in progress",
            Self::CaptureTransition => "microphone is busy",
            Self::NotRecording => "not recording",
        };
        f.write_str(text)
    }
}

/// Result of `send_text`.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Rejected(RejectReason),
    /// The assistant answered; the reply turn was appended.
    Replied(Turn),
    /// The send failed; an Error turn was appended.
    Failed(Turn),
}

/// Result of `start_voice_capture` when the device did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Rejected(RejectReason),
    Started,
}

/// Result of `stop_voice_capture`.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    Rejected(RejectReason),
    /// Nothing was recorded; discarded.
    NoAudio,
    /// The recording held no recognisable speech; discarded.
    NoSpeech,
    Replied(Turn),
    Failed(Turn),
}

impl From<SendOutcome> for VoiceOutcome {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Rejected(reason) => Self::Rejected(reason),
            SendOutcome::Replied(turn) => Self::Replied(turn),
            SendOutcome::Failed(turn) => Self::Failed(turn),
        }
    }
}

/// Notifications broadcast to subscribers.
///
/// Turn settlement and playback settlement are separate events: a turn
/// settles when the reply lands, narration settles later (or never, if a
/// newer narration replaces it first).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    TurnAppended(Turn),
    LogCleared,
    PlaybackStarted(AudioRef),
    PlaybackSettled {
        audio_ref: AudioRef,
        result: Result<(), DeviceError>,
    },
}
