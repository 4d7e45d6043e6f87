use crate::models::{Artist, Track};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache contents are not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("cache lock poisoned")]
    Poisoned,
}

/// A full catalog snapshot. Replaced wholesale on refresh, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCache {
    pub label: String,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub fetched_at: DateTime<Utc>,
}

impl CatalogCache {
    pub fn new(label: &str, tracks: Vec<Track>, artists: Vec<Artist>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            label: label.to_string(),
            tracks,
            artists,
            fetched_at,
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) >= ttl
    }

    /// Distinct genre tags across the label's artists, in first-seen order
    pub fn genres(&self) -> Vec<String> {
        let mut genres: Vec<String> = Vec::new();
        for genre in self.artists.iter().flat_map(|a| a.genres.iter()) {
            if !genres.contains(genre) {
                genres.push(genre.clone());
            }
        }
        genres
    }
}

/// Key-value persistence for the catalog snapshot
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore: Send + Sync {
    fn get(&self) -> Result<Option<CatalogCache>, CacheError>;

    fn put(&self, cache: &CatalogCache) -> Result<(), CacheError>;
}

/// In-process store. Readers keep the snapshot they loaded while a new one is swapped in.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    slot: RwLock<Option<Arc<CatalogCache>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Option<Arc<CatalogCache>>, CacheError> {
        let slot = self.slot.read().map_err(|_| CacheError::Poisoned)?;
        Ok(slot.clone())
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self) -> Result<Option<CatalogCache>, CacheError> {
        Ok(self.snapshot()?.map(|cache| cache.as_ref().clone()))
    }

    fn put(&self, cache: &CatalogCache) -> Result<(), CacheError> {
        let fresh = Arc::new(cache.clone());
        let mut slot = self.slot.write().map_err(|_| CacheError::Poisoned)?;
        *slot = Some(fresh);
        Ok(())
    }
}

/// JSON file store. Writes go to a sibling temp file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self) -> Result<Option<CatalogCache>, CacheError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&self, cache: &CatalogCache) -> Result<(), CacheError> {
        let temp = self.temp_path();
        std::fs::write(&temp, serde_json::to_vec(cache)?)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artist: "Artist".to_string(),
            artist_id: None,
            album: "Album".to_string(),
            album_id: None,
            image: "/icon.png".to_string(),
            duration_ms: 180_000,
            preview_url: None,
            uri: format!("spotify:track:{id}"),
            label: Some("Label".to_string()),
            tempo: None,
        }
    }

    fn sample_cache(fetched_at: DateTime<Utc>) -> CatalogCache {
        CatalogCache::new(
            "Label",
            vec![sample_track("1"), sample_track("2")],
            vec![Artist {
                id: "a".to_string(),
                name: "Artist".to_string(),
                genres: vec!["pop".to_string(), "trap".to_string()],
                popularity: 50,
            }],
            fetched_at,
        )
    }

    #[test]
    fn expiry_is_measured_against_ttl() {
        let now = Utc::now();
        let ttl = Duration::hours(DEFAULT_TTL_HOURS);
        assert!(!sample_cache(now - Duration::hours(23)).is_expired(ttl, now));
        assert!(sample_cache(now - Duration::hours(24)).is_expired(ttl, now));
        assert!(sample_cache(now - Duration::days(3)).is_expired(ttl, now));
    }

    #[test]
    fn memory_store_replaces_snapshot_wholesale() {
        let store = MemoryCacheStore::new();
        assert!(store.get().unwrap().is_none());

        let first = sample_cache(Utc::now());
        store.put(&first).unwrap();
        let held = store.snapshot().unwrap().unwrap();

        let mut second = sample_cache(Utc::now());
        second.tracks.truncate(1);
        store.put(&second).unwrap();

        // The reader that loaded the first snapshot still sees it intact
        assert_eq!(held.tracks.len(), 2);
        assert_eq!(store.get().unwrap().unwrap().tracks.len(), 1);
    }

    #[test]
    fn file_store_roundtrips_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("catalog.json"));
        assert!(store.get().unwrap().is_none());

        let cache = sample_cache(Utc::now());
        store.put(&cache).unwrap();
        assert_eq!(store.get().unwrap(), Some(cache));
        assert!(!dir.path().join("catalog.json.tmp").exists());
    }

    #[test]
    fn file_store_surfaces_corrupt_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileCacheStore::new(&path).get(),
            Err(CacheError::Serde(_))
        ));
    }

    #[test]
    fn genres_are_deduplicated() {
        let mut cache = sample_cache(Utc::now());
        cache.artists.push(Artist {
            id: "b".to_string(),
            name: "Other".to_string(),
            genres: vec!["trap".to_string(), "cumbia".to_string()],
            popularity: 10,
        });
        assert_eq!(cache.genres(), vec!["pop", "trap", "cumbia"]);
    }
}
