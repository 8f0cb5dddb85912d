//! `jukebox`: drive playback sessions from a line-oriented console.
//!
//! Each input line is `<server-id> <command> [args...]`; type `help` for the
//! command list. Voice channels are simulated in-process and tracks advance on
//! wall-clock time, so the queue logic can be exercised without a chat gateway.

mod clock_sink;
mod commands;
mod local_voice;
mod media;
mod startup;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "jukebox", version = VERSION)]
struct Args {
    /// Optional bot config file (TOML). Defaults to `config.toml` beside the executable.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed shuffle seed; overrides `playback.shuffle_seed`.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,jukebox_core=info,jukebox_console=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    let result = runtime.block_on(startup::run(args));
    // Console input is read on a blocking thread that never returns on its own.
    runtime.shutdown_background();
    result
}
