mod command;
mod render;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use parley::{
    AudioDevice, Author, CaptureOutcome, ClientConfig, FileAudioBackend, HttpGateway, SendOutcome,
    SessionOrchestrator, VersionInfo, VoiceOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Command, HELP};
use crate::render::Renderer;

#[derive(Debug, Default, PartialEq)]
struct Args {
    url: Option<String>,
    user: Option<String>,
    no_voice: bool,
    capture_file: Option<PathBuf>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            print_usage();
            process::exit(2);
        }
    };

    init_tracing();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            process::exit(1);
        }
    };

    let result = runtime.block_on(run(args));
    // stdin is read on a blocking thread that would otherwise hold shutdown open.
    runtime.shutdown_background();

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: parley [--url <url>] [--user <id>] [--no-voice] [--capture-file <wav>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --url <url>            Assistant backend [env: PARLEY_BASE_URL]");
    eprintln!("  --user <id>            Conversation owner [env: PARLEY_USER_ID]");
    eprintln!("  --no-voice             Do not request synthesized speech");
    eprintln!("  --capture-file <wav>   Clip returned by /record");
    eprintln!();
    eprintln!("Logging: PARLEY_LOG=debug|info|warn|error, LOG_FORMAT=json");
    eprintln!("         RUST_LOG overrides PARLEY_LOG");
}

/// `Ok(None)` when help was requested.
fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut parsed = Args::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--url" => {
                i += 1;
                parsed.url = Some(args.get(i).ok_or("--url requires a value")?.clone());
            }
            "--user" => {
                i += 1;
                parsed.user = Some(args.get(i).ok_or("--user requires a value")?.clone());
            }
            "--capture-file" => {
                i += 1;
                let path = args.get(i).ok_or("--capture-file requires a value")?;
                parsed.capture_file = Some(PathBuf::from(path));
            }
            "--no-voice" => parsed.no_voice = true,
            "--help" | "-h" => return Ok(None),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    Ok(Some(parsed))
}

/// Logs go to stderr so they never interleave with the conversation on stdout.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("PARLEY_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("info") => "info",
            Ok("error") => "error",
            _ => "warn",
        };
        EnvFilter::new(format!("parley={level},parley_cli={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn build_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("invalid PARLEY_* environment")?;
    if let Some(url) = &args.url {
        config = config.with_base_url(url)?;
    }
    if let Some(user) = &args.user {
        config = config.with_user_id(user.clone())?;
    }
    if args.no_voice {
        config = config.with_voice_enabled(false);
    }
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let version = VersionInfo::new().with_surface("terminal");
    tracing::info!(
        base_url = %config.base_url,
        user_id = %config.user_id,
        user_agent = %version.user_agent(),
        "Starting session"
    );

    let gateway =
        Arc::new(HttpGateway::new(&config, &version).context("failed to build HTTP client")?);
    let backend = Arc::new(FileAudioBackend::new(args.capture_file));
    let device = Arc::new(AudioDevice::new(backend));
    let session = Arc::new(SessionOrchestrator::start(config, gateway, device).await);

    let initial = session.state();
    println!("{}", render::connection(&initial));
    println!("Type /help for commands.");

    let cancel = CancellationToken::new();
    let poller = parley::spawn_health_poller(
        Arc::clone(&session),
        session.config().health_interval,
        cancel.clone(),
    );
    let printer = spawn_printer(&session, Renderer::new(&initial), cancel.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("failed to read input")?,
        };
        let Some(line) = line else { break };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("  [{msg}]");
                continue;
            }
        };

        if !dispatch(&session, command).await {
            break;
        }
    }

    cancel.cancel();
    session.stop_narration().await;
    let _ = tokio::join!(poller, printer);
    Ok(())
}

/// Returns `false` when the user asked to quit.
///
/// Sends run in the background so the prompt stays responsive (e.g. `/clear`
/// while a reply is pending).
async fn dispatch(session: &Arc<SessionOrchestrator>, command: Command) -> bool {
    match command {
        Command::Say(text) => {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                if let SendOutcome::Rejected(reason) = session.send_text(&text).await {
                    println!("{}", render::rejection(reason));
                }
            });
        }
        Command::Record => match session.start_voice_capture().await {
            Ok(CaptureOutcome::Started) => {}
            Ok(CaptureOutcome::Rejected(reason)) => println!("{}", render::rejection(reason)),
            Err(e) => println!("  [{}]", e.user_message()),
        },
        Command::Stop => {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                match session.stop_voice_capture().await {
                    VoiceOutcome::Rejected(reason) => println!("{}", render::rejection(reason)),
                    VoiceOutcome::NoAudio => println!("  [nothing was recorded]"),
                    VoiceOutcome::NoSpeech => println!("  [no speech detected]"),
                    VoiceOutcome::Replied(_) | VoiceOutcome::Failed(_) => {}
                }
            });
        }
        Command::Replay => {
            let last = session
                .turns()
                .into_iter()
                .rev()
                .find(|turn| turn.author() == Author::Assistant && !turn.is_error());
            match last {
                Some(turn) => {
                    if let Err(e) = session.speak(&turn).await {
                        println!("  [{}]", e.user_message());
                    }
                }
                None => println!("  [nothing to replay]"),
            }
        }
        Command::Mute => session.stop_narration().await,
        Command::Clear => {
            session.clear_conversation();
        }
        Command::Forget => match session.clear_remote_history().await {
            Ok(()) => println!("  [backend history cleared]"),
            Err(e) => println!("  [{}]", e.user_message()),
        },
        Command::History(limit) => match session.remote_history(limit).await {
            Ok(entries) if entries.is_empty() => println!("  [no history]"),
            Ok(entries) => {
                for entry in &entries {
                    println!("  {}", render::history_entry(entry));
                }
            }
            Err(e) => println!("  [{}]", e.user_message()),
        },
        Command::Health => {
            let status = session.check_connection().await;
            println!("  [{:?}] {}", status.connection, status.detail);
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

fn spawn_printer(
    session: &SessionOrchestrator,
    mut renderer: Renderer,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    if let Some(line) = renderer.render(&event, &Local) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Display fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("parley")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn no_flags_uses_environment() {
        assert_eq!(parse_args(&argv(&[])), Ok(Some(Args::default())));
    }

    #[test]
    fn flags_are_parsed() {
        let args = parse_args(&argv(&[
            "--url",
            "http://assistant.local:8000",
            "--user",
            "ada",
            "--no-voice",
            "--capture-file",
            "clip.wav",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(args.url.as_deref(), Some("http://assistant.local:8000"));
        assert_eq!(args.user.as_deref(), Some("ada"));
        assert!(args.no_voice);
        assert_eq!(args.capture_file, Some(PathBuf::from("clip.wav")));
    }

    #[test]
    fn help_short_circuits() {
        assert_eq!(parse_args(&argv(&["--no-voice", "-h"])), Ok(None));
    }

    #[test]
    fn missing_value_is_an_error() {
        assert_eq!(
            parse_args(&argv(&["--url"])),
            Err("--url requires a value".to_string())
        );
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert_eq!(
            parse_args(&argv(&["--verbose"])),
            Err("unknown flag: --verbose".to_string())
        );
    }
}
