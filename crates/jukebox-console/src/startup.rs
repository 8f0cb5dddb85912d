//! Console startup: config, collaborators and the input loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use jukebox_core::config::{
    BotConfig, default_volume_from_config, display_limits_from_config,
    join_timeout_from_config, shuffle_seed_from_config,
};
use jukebox_core::presets::PresetCatalog;
use jukebox_core::{EventBus, SessionEvent, SessionRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};

use crate::commands::{self, CommandContext};
use crate::local_voice::LocalVoiceGateway;
use crate::media::MediaResolver;

/// Build the command context and serve console input until EOF or Ctrl-C.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let seed = args.seed.or_else(|| shuffle_seed_from_config(&cfg));
    let presets = PresetCatalog::from_config(&cfg);
    tracing::info!(
        version = crate::VERSION,
        presets = presets.len(),
        join_timeout_secs = join_timeout_from_config(&cfg).as_secs(),
        seeded = seed.is_some(),
        "starting jukebox console"
    );

    let events = EventBus::new();
    spawn_event_logger(events.subscribe());

    let media = Arc::new(MediaResolver::new());
    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let ctx = CommandContext {
        registry: SessionRegistry::new(events).with_shuffle_seed(seed),
        gateway: Arc::new(LocalVoiceGateway::new()),
        resolver: media.clone(),
        probe: media,
        presets,
        limits: display_limits_from_config(&cfg),
        join_timeout: join_timeout_from_config(&cfg),
        default_volume: default_volume_from_config(&cfg),
        outbox,
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    setup_shutdown(shutdown_tx);

    println!("jukebox {} ready. Type `help` for commands.", crate::VERSION);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            Some(notice) = inbox.recv() => println!("{notice}"),
            line = lines.next_line() => {
                let Some(line) = line.context("read console input")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                println!("{}", commands::handle_line(&ctx, &line).await);
            }
        }
    }

    let closed = ctx.registry.close_all();
    tracing::info!(sessions = closed, "shutting down");
    Ok(())
}

/// Load config from `--config`, else `config.toml` beside the executable.
///
/// Every setting has a default, so running without a config file is fine.
fn load_config(path: Option<&PathBuf>) -> Result<BotConfig> {
    match path {
        Some(path) => BotConfig::load(path),
        None => {
            let auto_path = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
            match auto_path {
                Some(path) if path.exists() => BotConfig::load(&path),
                _ => {
                    tracing::info!("no config file found; using defaults");
                    Ok(BotConfig::default())
                }
            }
        }
    }
}

fn spawn_event_logger(mut events: broadcast::Receiver<SessionEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::TrackFailed {
                    server,
                    title,
                    error,
                }) => {
                    tracing::debug!(server = %server, title = %title, error = %error, "track failed");
                }
                Ok(SessionEvent::SessionClosed { server }) => {
                    tracing::debug!(server = %server, "session closed");
                }
                Ok(event) => tracing::trace!(?event, "session event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "session event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn setup_shutdown(shutdown: watch::Sender<bool>) {
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = shutdown.send(true);
    }) {
        tracing::warn!(error = %err, "failed to install Ctrl-C handler");
    }
}
