//! parley: client-side session orchestration for a voice and text assistant.
//!
//! A [`SessionOrchestrator`] owns the conversation log and decides when a
//! turn may be sent. It talks to the backend through a [`Gateway`] and to
//! the microphone and speaker through an [`AudioDevice`]. Presentation layers
//! observe it via [`SessionState`] snapshots and [`SessionEvent`]s.

pub mod config;
pub mod conversation;
pub mod device;
pub mod error;
pub mod gateway;
pub mod health;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod turn;
pub mod version;

pub use config::ClientConfig;
pub use conversation::ConversationLog;
pub use device::{AudioBackend, AudioDevice, DeviceRole, FileAudioBackend};
pub use error::{ConfigError, DeviceError, TransportError};
pub use gateway::{ChatReply, ChatRequest, Gateway, HealthReport, HttpGateway, Transcript};
pub use health::{Connection, ConnectionStatus};
pub use orchestrator::SessionOrchestrator;
pub use poller::spawn_health_poller;
pub use session::{
    CaptureOutcome, Phase, RejectReason, SendOutcome, SessionEvent, SessionState, VoiceOutcome,
};
pub use turn::{AudioRef, Author, NewTurn, Turn, TurnStatus};
pub use version::{PARLEY_VERSION, VersionInfo};
