//! Slash commands typed at the prompt.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text for the assistant.
    Say(String),
    Record,
    Stop,
    /// Narrate the last assistant reply.
    Replay,
    Mute,
    Clear,
    /// Clear the backend's copy of the conversation.
    Forget,
    History(Option<usize>),
    Health,
    Help,
    Quit,
}

impl Command {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        // `//text` sends text that starts with a slash.
        if let Some(text) = line.strip_prefix("//") {
            return Ok(Some(Self::Say(format!("/{text}"))));
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Say(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (rest, None),
        };

        let command = match name {
            "record" | "rec" => Self::Record,
            "stop" => Self::Stop,
            "replay" => Self::Replay,
            "mute" => Self::Mute,
            "clear" => Self::Clear,
            "forget" => Self::Forget,
            "history" => {
                let limit = arg
                    .map(|n| {
                        n.parse::<usize>()
                            .map_err(|_| format!("invalid history limit: {n}"))
                    })
                    .transpose()?;
                Self::History(limit)
            }
            "health" => Self::Health,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: /{other} (try /help)")),
        };
        Ok(Some(command))
    }
}

pub const HELP: &str = "\
Type a message and press enter to send it.

  /record         start recording from the capture source
  /stop           stop recording and send what was said
  /replay         narrate the last reply again
  /mute           stop narration
  /clear          clear the local conversation
  /forget         clear the conversation stored by the backend
  /history [n]    show the backend's last n messages
  /health         check the backend connection
  /quit           exit";
