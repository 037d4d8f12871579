//! Terminal rendering of session events.

use std::fmt::Display;

use chrono::TimeZone;
use parley::{
    Author, Connection, Phase, RejectReason, SessionEvent, SessionState, Turn, TurnStatus,
};

/// Turns session events into printable lines, suppressing state changes the
/// user already knows about.
#[derive(Debug, Default)]
pub struct Renderer {
    connection: Option<Connection>,
    phase: Phase,
}

impl Renderer {
    pub fn new(initial: &SessionState) -> Self {
        Self {
            connection: Some(initial.connection),
            phase: initial.phase,
        }
    }

    pub fn render<Tz>(&mut self, event: &SessionEvent, tz: &Tz) -> Option<String>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        match event {
            SessionEvent::TurnAppended(turn) => Some(self::turn(turn, tz)),
            SessionEvent::StateChanged(state) => self.state_changed(state),
            SessionEvent::LogCleared => Some("-- conversation cleared --".to_string()),
            SessionEvent::PlaybackStarted(audio) => Some(format!("  [narrating {audio}]")),
            SessionEvent::PlaybackSettled {
                result: Err(e), ..
            } => Some(format!("  [narration failed: {}]", e.user_message())),
            SessionEvent::PlaybackSettled { .. } => None,
        }
    }

    fn state_changed(&mut self, state: &SessionState) -> Option<String> {
        let mut lines = Vec::new();

        if self.connection != Some(state.connection) {
            self.connection = Some(state.connection);
            lines.push(connection(state));
        }

        if self.phase != state.phase {
            self.phase = state.phase;
            match state.phase {
                Phase::Recording => lines.push("  [recording, /stop to send]".to_string()),
                Phase::Transcribing => lines.push("  [transcribing...]".to_string()),
                Phase::Sending => lines.push("  [thinking...]".to_string()),
                Phase::Idle => {}
            }
        }

        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

pub fn connection(state: &SessionState) -> String {
    let label = match state.connection {
        Connection::Online => "online",
        Connection::Degraded => "degraded",
        Connection::Offline => "offline",
    };
    format!("[{label}] {}", state.connection_detail)
}

pub fn turn<Tz>(turn: &Turn, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = turn.timestamp().with_timezone(tz).format("%H:%M:%S");
    format!("{time} {}", turn_body(turn))
}

pub fn turn_body(turn: &Turn) -> String {
    let speaker = match (turn.author(), turn.status()) {
        (_, TurnStatus::Error) => "error",
        (Author::User, _) => "you",
        (Author::Assistant, _) => "assistant",
    };

    let mut out = format!("{speaker}: {}", turn.text());
    if turn.clarification_needed() {
        out.push_str("\n  (the assistant needs more detail)");
    }
    for suggestion in turn.suggestions() {
        out.push_str("\n  > ");
        out.push_str(suggestion);
    }
    out
}

pub fn rejection(reason: RejectReason) -> String {
    format!("  [not now: {reason}]")
}

/// One backend history entry (`{"role", "content", "timestamp"}`).
pub fn history_entry(entry: &serde_json::Value) -> String {
    let role = entry
        .get("role")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");
    let content = entry
        .get("content")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    format!("{role}: {content}")
}
