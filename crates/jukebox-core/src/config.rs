//! Configuration loading and parsing.
//!
//! Defines the bot config schema and resolves defaults. Every field is
//! optional; a missing file behaves like an empty one.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::display::DisplayLimits;

const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 25;
const DEFAULT_VOLUME: f32 = 1.0;

/// Top-level bot configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct BotConfig {
    /// Voice connection settings.
    pub voice: Option<VoiceConfig>,
    /// Queue listing limits.
    pub display: Option<DisplayConfig>,
    /// Playback defaults.
    pub playback: Option<PlaybackConfig>,
    /// Named shortcuts for the `preset` command.
    pub presets: Option<Vec<PresetConfig>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceConfig {
    /// Seconds to wait for a voice connection to become ready (default: 25).
    pub join_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisplayConfig {
    /// Maximum queue entries listed in one reply (default: 10).
    pub max_items: Option<usize>,
    /// Character budget for one reply (default: 1800).
    pub max_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaybackConfig {
    /// Linear volume in `[0, 1]` for tracks queued without one (default: 1.0).
    pub default_volume: Option<f32>,
    /// Fixed seed for shuffle; unset means a fresh seed per session.
    pub shuffle_seed: Option<u64>,
}

/// Preset entry from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PresetConfig {
    /// Name used with the `preset` command (case-insensitive).
    pub name: String,
    /// File path or URL.
    pub source: String,
    /// Optional per-preset volume.
    pub volume: Option<f32>,
}

impl BotConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Parse config from TOML text.
    pub fn parse(raw: &str) -> Result<Self> {
        let cfg: BotConfig = toml::from_str(raw).context("invalid config TOML")?;
        Ok(cfg)
    }
}

/// Resolve the voice join timeout.
pub fn join_timeout_from_config(cfg: &BotConfig) -> Duration {
    let secs = cfg
        .voice
        .as_ref()
        .and_then(|voice| voice.join_timeout_secs)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_JOIN_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Resolve queue listing limits, falling back to the defaults per field.
pub fn display_limits_from_config(cfg: &BotConfig) -> DisplayLimits {
    let defaults = DisplayLimits::default();
    let Some(display) = cfg.display.as_ref() else {
        return defaults;
    };
    DisplayLimits {
        max_items: display.max_items.unwrap_or(defaults.max_items),
        max_chars: display.max_chars.unwrap_or(defaults.max_chars),
    }
}

/// Resolve the default track volume, clamped to `[0, 1]`.
pub fn default_volume_from_config(cfg: &BotConfig) -> f32 {
    cfg.playback
        .as_ref()
        .and_then(|playback| playback.default_volume)
        .filter(|volume| volume.is_finite())
        .map(|volume| volume.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_VOLUME)
}

pub fn shuffle_seed_from_config(cfg: &BotConfig) -> Option<u64> {
    cfg.playback.as_ref().and_then(|playback| playback.shuffle_seed)
}
