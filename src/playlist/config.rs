use crate::catalog::CatalogSettings;
use crate::prompt::DurationParser;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// How the language model takes part in choosing tracks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// The model produces selection criteria; the selector picks from the catalog
    #[default]
    Criteria,
    /// The model names songs, which are resolved and verified against the label
    SpecificTracks,
    /// The model picks directly from the indexed catalog
    CatalogPick,
}

/// What to do with tracks whose tempo is unknown while a BPM range is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoPolicy {
    /// Drop them, even if nothing is left
    #[default]
    Strict,
    /// Keep them only when the strict filter would leave no tracks
    Relaxed,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "criteria" => Ok(StrategyKind::Criteria),
            "specific_tracks" => Ok(StrategyKind::SpecificTracks),
            "catalog_pick" => Ok(StrategyKind::CatalogPick),
            other => Err(format!(
                "unknown strategy '{other}' (expected criteria, specific-tracks or catalog-pick)"
            )),
        }
    }
}

impl FromStr for TempoPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "strict" => Ok(TempoPolicy::Strict),
            "relaxed" => Ok(TempoPolicy::Relaxed),
            other => Err(format!("unknown tempo policy '{other}' (expected strict or relaxed)")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Criteria => "criteria",
            StrategyKind::SpecificTracks => "specific-tracks",
            StrategyKind::CatalogPick => "catalog-pick",
        };
        write!(f, "{name}")
    }
}

/// Tunables for track selection, loaded from an optional JSON file.
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub strategy: StrategyKind,
    pub tempo_policy: TempoPolicy,
    /// Seed the shuffle from the prompt so the same prompt regenerates the same order
    pub seeded_shuffle: bool,
    pub final_shuffle: bool,
    /// Number of most recent picks checked for repeats of the same artist
    pub diversity_window: usize,
    pub artist_cap: usize,
    pub large_playlist_artist_cap: usize,
    /// Playlists longer than this use `large_playlist_artist_cap`
    pub large_playlist_threshold: usize,
    pub min_tracks: usize,
    pub max_tracks: usize,
    pub minutes_per_track: f64,
    pub default_minutes: u32,
    pub catalog_track_budget: usize,
    pub catalog_artist_budget: usize,
    pub cache_ttl_hours: i64,
    pub resolver_delay_ms: u64,
    pub require_activity_and_duration: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Criteria,
            tempo_policy: TempoPolicy::Strict,
            seeded_shuffle: true,
            final_shuffle: true,
            diversity_window: 2,
            artist_cap: 3,
            large_playlist_artist_cap: 5,
            large_playlist_threshold: 30,
            min_tracks: 10,
            max_tracks: 100,
            minutes_per_track: 3.5,
            default_minutes: 20,
            catalog_track_budget: 200,
            catalog_artist_budget: 100,
            cache_ttl_hours: 24,
            resolver_delay_ms: 500,
            require_activity_and_duration: false,
        }
    }
}

impl SelectionConfig {
    /// Load selection settings from a JSON object file
    pub fn load_from_file(path: &str) -> Result<SelectionConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading selection config {path}"))?;
        let config: SelectionConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing selection config {path}"))?;
        Ok(config)
    }

    /// Per-artist cap for a playlist of the given length
    pub fn artist_cap_for(&self, max_tracks: usize) -> usize {
        if max_tracks > self.large_playlist_threshold {
            self.large_playlist_artist_cap
        } else {
            self.artist_cap
        }
    }

    pub fn duration_parser(&self) -> DurationParser {
        DurationParser::new(
            self.minutes_per_track,
            self.default_minutes,
            self.min_tracks,
            self.max_tracks,
        )
    }

    /// Catalog budgets; an out-of-range cache TTL falls back to the default
    pub fn catalog_settings(&self) -> CatalogSettings {
        let defaults = CatalogSettings::default();
        let ttl = match chrono::Duration::try_hours(self.cache_ttl_hours) {
            Some(ttl) => ttl,
            None => {
                warn!(hours = self.cache_ttl_hours, "Cache TTL out of range, using the default");
                defaults.ttl
            }
        };
        CatalogSettings {
            track_budget: self.catalog_track_budget,
            artist_budget: self.catalog_artist_budget,
            ttl,
            ..defaults
        }
    }

    pub fn resolver_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.resolver_delay_ms)
    }
}
