//! Console command parsing and dispatch.
//!
//! Input lines are validated completely before any session is touched; replies
//! are plain text, one message per command.

use std::sync::Arc;
use std::time::Duration;

use jukebox_core::display::{DisplayLimits, format_duration, format_queue};
use jukebox_core::presets::PresetCatalog;
use jukebox_core::{
    MediaInfo, ResourceResolver, Session, SessionRegistry, SourceRef, Track, TrackHooks,
};
use jukebox_types::{ChannelId, ServerId};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::local_voice::LocalVoiceGateway;
use crate::media::MediaProbe;

/// Name recorded as the requester of console-queued tracks.
const REQUESTER: &str = "console";

pub(crate) const HELP: &str = "\
Commands are written as `<server-id> <command> [args]`:
  join <channel-id>        join a voice channel
  leave                    leave and clear everything
  play <source>            queue a file path or URL
  playnow <source>         play a source right away
  playall [--front] <source>...
                           queue several sources (shuffled when shuffle is on)
  preset <name>            queue a configured preset
  presets                  list configured presets
  skip [n]                 skip the current track and the next n-1
  skip <lo>-<hi>           remove queue entries lo..=hi (0 is the current track)
  stop                     stop playback and clear the queue
  pause | resume
  repeat on|off            replay the current track
  loop on|off              put finished tracks back in the queue
  shuffle on|off           shuffle the queue
  queue                    show the queue
  status                   session snapshot as JSON
  disconnect               simulate losing the voice connection
  help";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Join(ChannelId),
    Leave,
    Play(String),
    PlayNow(String),
    PlayAll { sources: Vec<String>, front: bool },
    Preset(String),
    Presets,
    Skip(usize),
    SkipRange(usize, usize),
    Stop,
    Pause,
    Resume,
    Repeat(bool),
    Loop(bool),
    Shuffle(bool),
    Queue,
    Status,
    Disconnect,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum CommandError {
    #[error("Type `help` for a list of commands.")]
    Empty,
    #[error("`{0}` is not a valid server id.")]
    BadServer(String),
    #[error("Unknown command `{0}`. Type `help` for a list of commands.")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a valid number.")]
    BadNumber(String),
    #[error("Skip count must be at least 1.")]
    ZeroSkip,
    #[error("Range start {0} is past its end {1}.")]
    InvertedRange(usize, usize),
    #[error("Expected `on` or `off`, got `{0}`.")]
    BadToggle(String),
}

/// A parsed input line. `help` needs no server id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Request {
    pub(crate) server: Option<ServerId>,
    pub(crate) command: Command,
}

fn parse_number(raw: &str) -> Result<usize, CommandError> {
    raw.parse::<usize>()
        .map_err(|_| CommandError::BadNumber(raw.to_string()))
}

fn parse_toggle(args: &[&str], usage: &'static str) -> Result<bool, CommandError> {
    match args {
        [value] => match value.to_ascii_lowercase().as_str() {
            "on" => Ok(true),
            "off" => Ok(false),
            _ => Err(CommandError::BadToggle(value.to_string())),
        },
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_skip(args: &[&str]) -> Result<Command, CommandError> {
    match args {
        [] => Ok(Command::Skip(1)),
        [arg] => {
            if let Some((lo, hi)) = arg.split_once('-') {
                let lo = parse_number(lo)?;
                let hi = parse_number(hi)?;
                if lo > hi {
                    return Err(CommandError::InvertedRange(lo, hi));
                }
                Ok(Command::SkipRange(lo, hi))
            } else {
                match parse_number(arg)? {
                    0 => Err(CommandError::ZeroSkip),
                    n => Ok(Command::Skip(n)),
                }
            }
        }
        _ => Err(CommandError::Usage("skip [n] | skip <lo>-<hi>")),
    }
}

fn parse_command(name: &str, args: &[&str]) -> Result<Command, CommandError> {
    let rest = || args.join(" ");
    let command = match name.to_ascii_lowercase().as_str() {
        "join" => match args {
            [channel] => Command::Join(ChannelId(
                channel
                    .parse::<u64>()
                    .map_err(|_| CommandError::BadNumber(channel.to_string()))?,
            )),
            _ => return Err(CommandError::Usage("join <channel-id>")),
        },
        "leave" => Command::Leave,
        "play" if !args.is_empty() => Command::Play(rest()),
        "play" => return Err(CommandError::Usage("play <source>")),
        "playnow" if !args.is_empty() => Command::PlayNow(rest()),
        "playnow" => return Err(CommandError::Usage("playnow <source>")),
        "playall" => {
            let (front, sources) = match args {
                ["--front", sources @ ..] => (true, sources),
                sources => (false, sources),
            };
            if sources.is_empty() {
                return Err(CommandError::Usage("playall [--front] <source>..."));
            }
            Command::PlayAll {
                sources: sources.iter().map(|s| s.to_string()).collect(),
                front,
            }
        }
        "preset" if !args.is_empty() => Command::Preset(rest()),
        "preset" => return Err(CommandError::Usage("preset <name>")),
        "presets" => Command::Presets,
        "skip" => parse_skip(args)?,
        "stop" => Command::Stop,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "repeat" => Command::Repeat(parse_toggle(args, "repeat on|off")?),
        "loop" => Command::Loop(parse_toggle(args, "loop on|off")?),
        "shuffle" => Command::Shuffle(parse_toggle(args, "shuffle on|off")?),
        "queue" => Command::Queue,
        "status" => Command::Status,
        "disconnect" => Command::Disconnect,
        "help" => Command::Help,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

pub(crate) fn parse_line(line: &str) -> Result<Request, CommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(CommandError::Empty),
        [only] if only.eq_ignore_ascii_case("help") => Ok(Request {
            server: None,
            command: Command::Help,
        }),
        [server, name, args @ ..] => {
            let server = server
                .parse::<u64>()
                .map(ServerId)
                .map_err(|_| CommandError::BadServer(server.to_string()))?;
            Ok(Request {
                server: Some(server),
                command: parse_command(name, args)?,
            })
        }
        [other] => match other.parse::<u64>() {
            Ok(_) => Err(CommandError::Empty),
            Err(_) => Err(CommandError::BadServer(other.to_string())),
        },
    }
}

/// Everything a command needs besides the session itself.
pub(crate) struct CommandContext {
    pub(crate) registry: SessionRegistry,
    pub(crate) gateway: Arc<LocalVoiceGateway>,
    pub(crate) resolver: Arc<dyn ResourceResolver>,
    pub(crate) probe: Arc<dyn MediaProbe>,
    pub(crate) presets: PresetCatalog,
    pub(crate) limits: DisplayLimits,
    pub(crate) join_timeout: Duration,
    pub(crate) default_volume: f32,
    /// Asynchronous notices (track started/finished/failed).
    pub(crate) outbox: mpsc::UnboundedSender<String>,
}

/// Parse and run one input line, returning the reply.
pub(crate) async fn handle_line(ctx: &CommandContext, line: &str) -> String {
    match parse_line(line) {
        Ok(Request { server: None, .. }) => HELP.to_string(),
        Ok(Request {
            server: Some(server),
            command,
        }) => execute(ctx, server, command).await,
        Err(err) => err.to_string(),
    }
}

const NOT_CONNECTED: &str = "Not connected to a voice channel. Use `join <channel-id>` first.";

pub(crate) async fn execute(ctx: &CommandContext, server: ServerId, command: Command) -> String {
    match command {
        Command::Help => HELP.to_string(),
        Command::Join(channel) => join(ctx, server, channel).await,
        Command::Presets => {
            if ctx.presets.is_empty() {
                "No presets configured.".to_string()
            } else {
                format!("Presets: {}", ctx.presets.names().join(", "))
            }
        }
        command => {
            let Some(session) = ctx.registry.get(server) else {
                return NOT_CONNECTED.to_string();
            };
            execute_in_session(ctx, &session, command).await
        }
    }
}

async fn join(ctx: &CommandContext, server: ServerId, channel: ChannelId) -> String {
    if let Some(existing) = ctx.registry.get(server) {
        return format!("Already connected to channel {}.", existing.channel());
    }
    match ctx
        .registry
        .open(
            ctx.gateway.as_ref(),
            ctx.resolver.clone(),
            server,
            channel,
            ctx.join_timeout,
        )
        .await
    {
        Ok(_) => format!("Joined channel {channel}."),
        Err(err) => format!("Could not join channel {channel}: {err}"),
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn toggle_reply(label: &str, on: bool, changed: bool) -> String {
    match (changed, on) {
        (true, true) => format!("{label} enabled."),
        (true, false) => format!("{label} disabled."),
        (false, value) => format!("{label} is already {}.", on_off(value)),
    }
}

async fn execute_in_session(ctx: &CommandContext, session: &Session, command: Command) -> String {
    match command {
        Command::Leave => {
            ctx.registry.close(session.server());
            "Left the voice channel.".to_string()
        }
        Command::Play(raw) => match request_track(ctx, session.server(), &raw).await {
            Ok(track) => {
                session.enqueue(track.clone()).await;
                queued_reply(session, &track)
            }
            Err(reply) => reply,
        },
        Command::PlayNow(raw) => match request_track(ctx, session.server(), &raw).await {
            Ok(track) => {
                session.enqueue_front(track.clone()).await;
                format!("Playing {} now.", track.title())
            }
            Err(reply) => reply,
        },
        Command::PlayAll { sources, front } => {
            let mut tracks = Vec::new();
            let mut failures = Vec::new();
            for raw in &sources {
                match request_track(ctx, session.server(), raw).await {
                    Ok(track) => tracks.push(track),
                    Err(reply) => failures.push(reply),
                }
            }
            let count = tracks.len();
            session.enqueue_many(tracks, front).await;
            let mut reply = match count {
                0 => "Nothing was queued.".to_string(),
                1 => "Queued 1 track.".to_string(),
                n => format!("Queued {n} tracks."),
            };
            for failure in failures {
                reply.push('\n');
                reply.push_str(&failure);
            }
            reply
        }
        Command::Preset(name) => {
            let Some(preset) = ctx.presets.get(&name) else {
                return format!("Unknown preset `{name}`. Try `presets`.");
            };
            let mut info = MediaInfo::from_preset(preset);
            match ctx.probe.probe(&preset.source, preset.volume).await {
                Ok(probed) => info.duration_secs = probed.duration_secs,
                Err(err) => return format!("Could not queue preset `{}`: {err}", preset.name),
            }
            let track = build_track(ctx, session.server(), info);
            session.enqueue(track.clone()).await;
            queued_reply(session, &track)
        }
        Command::Skip(count) => {
            if session.now_playing().is_none() && session.queue().is_empty() {
                return "Nothing to skip.".to_string();
            }
            let removed = session.skip_count(count);
            match removed {
                0 => "Skipped.".to_string(),
                n => format!("Skipped the current track and {n} queued."),
            }
        }
        Command::SkipRange(lo, hi) => {
            let playing = session.now_playing().is_some();
            let removed = session.skip_range(lo, hi);
            match (lo, playing, removed) {
                (0, true, 0) => "Skipped.".to_string(),
                (0, true, n) => format!("Skipped the current track and {n} queued."),
                (0, false, 0) => "Nothing to skip.".to_string(),
                (_, _, 0) => "Nothing in that range.".to_string(),
                (_, _, n) => format!("Removed {n} from the queue."),
            }
        }
        Command::Stop => {
            if session.stop_all() {
                "Stopped playback and cleared the queue.".to_string()
            } else {
                "Nothing to stop.".to_string()
            }
        }
        Command::Pause => {
            if session.pause() {
                "Paused.".to_string()
            } else {
                "Nothing is playing.".to_string()
            }
        }
        Command::Resume => {
            if session.unpause() {
                "Resumed.".to_string()
            } else {
                "Nothing is paused.".to_string()
            }
        }
        Command::Repeat(on) => toggle_reply("Repeat", on, session.set_repeat(on)),
        Command::Loop(on) => toggle_reply("Loop", on, session.set_loop(on)),
        Command::Shuffle(true) => {
            session.set_shuffle(true);
            "Shuffle enabled; queue shuffled.".to_string()
        }
        Command::Shuffle(false) => toggle_reply("Shuffle", false, session.set_shuffle(false)),
        Command::Queue => format_queue(&session.snapshot(), ctx.limits),
        Command::Status => match serde_json::to_string_pretty(&session.snapshot()) {
            Ok(json) => json,
            Err(err) => format!("Could not encode status: {err}"),
        },
        Command::Disconnect => match ctx.gateway.connection(session.server()) {
            Some(connection) => {
                connection.drop_link();
                "Voice connection dropped.".to_string()
            }
            None => NOT_CONNECTED.to_string(),
        },
        Command::Join(_) | Command::Presets | Command::Help => HELP.to_string(),
    }
}

fn queued_reply(session: &Session, track: &Arc<Track>) -> String {
    let position = session
        .queue()
        .iter()
        .position(|queued| Arc::ptr_eq(queued, track));
    match position {
        Some(idx) => format!(
            "Queued {} [{}] at position {}.",
            track.title(),
            format_duration(track.duration_secs()),
            idx + 1
        ),
        None => format!("Starting {}.", track.title()),
    }
}

async fn request_track(
    ctx: &CommandContext,
    server: ServerId,
    raw: &str,
) -> Result<Arc<Track>, String> {
    let Some(source) = SourceRef::parse(raw) else {
        return Err("Nothing to play.".to_string());
    };
    let info = ctx
        .probe
        .probe(&source, ctx.default_volume)
        .await
        .map_err(|err| format!("Could not queue {raw}: {err}"))?;
    Ok(build_track(ctx, server, info))
}

fn build_track(ctx: &CommandContext, server: ServerId, info: MediaInfo) -> Arc<Track> {
    let hooks = lifecycle_hooks(ctx.outbox.clone(), server, &info.title);
    Arc::new(Track::from_media(info, REQUESTER, hooks))
}

/// Hooks that report a track's lifecycle to the console.
fn lifecycle_hooks(
    outbox: mpsc::UnboundedSender<String>,
    server: ServerId,
    title: &str,
) -> TrackHooks {
    let started = (outbox.clone(), title.to_string());
    let finished = (outbox.clone(), title.to_string());
    let failed = (outbox, title.to_string());
    TrackHooks::new()
        .on_start(move || {
            let (outbox, title) = started;
            let _ = outbox.send(format!(
                "[{server}] Now playing: {title} (requested by {REQUESTER})"
            ));
        })
        .on_finish(move || {
            let (outbox, title) = finished;
            let _ = outbox.send(format!("[{server}] Finished: {title}"));
        })
        .on_error(move |err| {
            let (outbox, title) = failed;
            let _ = outbox.send(format!("[{server}] Could not play {title}: {err}"));
        })
}
