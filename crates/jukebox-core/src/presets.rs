//! Named preset library loaded from config.

use std::collections::BTreeMap;

use crate::config::{BotConfig, default_volume_from_config};
use crate::track::{MediaInfo, SourceRef};

/// A named, pre-configured source with its default volume.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    pub name: String,
    pub source: SourceRef,
    pub volume: f32,
}

impl MediaInfo {
    /// Media record for a preset. Duration is unknown until the source is probed.
    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            source: preset.source.clone(),
            title: preset.name.clone(),
            duration_secs: 0,
            volume: preset.volume,
        }
    }
}

/// Case-insensitive preset lookup.
#[derive(Clone, Debug, Default)]
pub struct PresetCatalog {
    by_key: BTreeMap<String, Preset>,
}

fn preset_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl PresetCatalog {
    /// Build the catalog from `[[presets]]`. Entries with a blank name or
    /// source are skipped; a repeated name replaces the earlier entry.
    pub fn from_config(cfg: &BotConfig) -> Self {
        let default_volume = default_volume_from_config(cfg);
        let mut catalog = Self::default();
        for entry in cfg.presets.iter().flatten() {
            let name = entry.name.trim();
            let Some(source) = SourceRef::parse(&entry.source) else {
                tracing::warn!(preset = %entry.name, "preset has no source; skipping");
                continue;
            };
            if name.is_empty() {
                tracing::warn!(source = %source, "preset has no name; skipping");
                continue;
            }
            let volume = entry
                .volume
                .filter(|volume| volume.is_finite())
                .map(|volume| volume.clamp(0.0, 1.0))
                .unwrap_or(default_volume);
            let preset = Preset {
                name: name.to_string(),
                source,
                volume,
            };
            if catalog.by_key.insert(preset_key(name), preset).is_some() {
                tracing::warn!(preset = %name, "duplicate preset name; keeping the last entry");
            }
        }
        catalog
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.by_key.get(&preset_key(name))
    }

    /// Preset names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.by_key.values().map(|preset| preset.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(raw: &str) -> PresetCatalog {
        PresetCatalog::from_config(&BotConfig::parse(raw).expect("parse"))
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let catalog = catalog(
            r#"
[[presets]]
name = "Rain"
source = "/srv/ambient/rain.ogg"
volume = 0.4
"#,
        );
        let preset = catalog.get("  rAIN ").expect("preset");
        assert_eq!(preset.name, "Rain");
        assert_eq!(preset.source, SourceRef::parse("/srv/ambient/rain.ogg").unwrap());
        assert_eq!(preset.volume, 0.4);
        assert!(catalog.get("thunder").is_none());
    }

    #[test]
    fn missing_volume_uses_playback_default() {
        let catalog = catalog(
            r#"
[playback]
default_volume = 0.6

[[presets]]
name = "waves"
source = "https://example.com/waves.mp3"
"#,
        );
        assert_eq!(catalog.get("waves").expect("preset").volume, 0.6);
    }

    #[test]
    fn invalid_and_duplicate_entries() {
        let catalog = catalog(
            r#"
[[presets]]
name = "fire"
source = "/a.ogg"

[[presets]]
name = ""
source = "/b.ogg"

[[presets]]
name = "wind"
source = "   "

[[presets]]
name = "FIRE"
source = "/c.ogg"
"#,
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.names(), vec!["FIRE"]);
        assert_eq!(
            catalog.get("fire").expect("preset").source,
            SourceRef::parse("/c.ogg").unwrap()
        );
    }

    #[test]
    fn names_are_sorted_and_media_info_uses_name_as_title() {
        let catalog = catalog(
            r#"
[[presets]]
name = "zen"
source = "/z.ogg"

[[presets]]
name = "birds"
source = "/b.ogg"
volume = 2.0
"#,
        );
        assert_eq!(catalog.names(), vec!["birds", "zen"]);
        let info = MediaInfo::from_preset(catalog.get("birds").expect("preset"));
        assert_eq!(info.title, "birds");
        assert_eq!(info.volume, 1.0);
        assert_eq!(info.duration_secs, 0);
    }
}
