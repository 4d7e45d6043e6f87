use super::cache::{CacheStore, CatalogCache, DEFAULT_TTL_HOURS};
use super::label::LabelMatcher;
use crate::client::{MAX_DETAIL_IDS, StreamingApi};
use crate::error::{ApiError, PipelineError};
use crate::models::{Artist, FullTrack, SimplifiedAlbum, Track};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Request budget for one catalog rebuild
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub track_budget: usize,
    pub artist_budget: usize,
    pub album_search_limit: u32,
    pub ttl: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            track_budget: 200,
            artist_budget: 100,
            album_search_limit: 50,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }
}

/// Supplies the label's candidate tracks, from the cache while it is fresh.
/// The catalog is a best-effort sample bounded by the settings, not a full discography.
pub struct CatalogProvider<'a> {
    api: &'a dyn StreamingApi,
    store: &'a dyn CacheStore,
    label: &'a LabelMatcher,
    settings: CatalogSettings,
}

impl<'a> CatalogProvider<'a> {
    pub fn new(
        api: &'a dyn StreamingApi,
        store: &'a dyn CacheStore,
        label: &'a LabelMatcher,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            api,
            store,
            label,
            settings,
        }
    }

    pub fn load(&self) -> Result<CatalogCache, PipelineError> {
        self.load_at(Utc::now())
    }

    /// Serve the cached catalog unless it is missing, stale, unreadable or for another label
    pub fn load_at(&self, now: DateTime<Utc>) -> Result<CatalogCache, PipelineError> {
        match self.store.get() {
            Ok(Some(cache)) if cache.label != self.label.label() => {
                info!(cached = %cache.label, "Catalog cache belongs to another label, rebuilding");
            }
            Ok(Some(cache)) if cache.is_expired(self.settings.ttl, now) => {
                info!(fetched_at = %cache.fetched_at, "Catalog cache expired, rebuilding");
            }
            Ok(Some(cache)) => {
                info!(
                    tracks = cache.tracks.len(),
                    artists = cache.artists.len(),
                    fetched_at = %cache.fetched_at,
                    "Using cached catalog"
                );
                return Ok(cache);
            }
            Ok(None) => debug!("No catalog cache, building"),
            Err(err) => warn!(%err, "Catalog cache unreadable, rebuilding"),
        }

        self.refresh_at(now)
    }

    pub fn refresh(&self) -> Result<CatalogCache, PipelineError> {
        self.refresh_at(Utc::now())
    }

    /// Rebuild from the streaming API and replace the cache. On failure the cache is left as it was.
    pub fn refresh_at(&self, now: DateTime<Utc>) -> Result<CatalogCache, PipelineError> {
        let (tracks, artists) = self.rebuild()?;
        let cache = CatalogCache::new(self.label.label(), tracks, artists, now);

        info!(
            tracks = cache.tracks.len(),
            artists = cache.artists.len(),
            label = %cache.label,
            "Catalog rebuilt"
        );

        if cache.tracks.is_empty() {
            warn!("Catalog rebuild found no tracks, not caching it");
        } else if let Err(err) = self.store.put(&cache) {
            warn!(%err, "Failed to store catalog cache");
        }

        Ok(cache)
    }

    fn rebuild(&self) -> Result<(Vec<Track>, Vec<Artist>), ApiError> {
        let albums = self.search_label_albums()?;
        debug!(albums = albums.len(), "Found label albums");

        std::thread::scope(|scope| {
            let artists = scope.spawn(|| self.fetch_artists(&albums));
            let tracks = self.fetch_tracks(&albums);
            let artists = artists
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            Ok((tracks?, artists?))
        })
    }

    /// Albums tagged with any spelling of the label, deduplicated by id
    fn search_label_albums(&self) -> Result<Vec<SimplifiedAlbum>, ApiError> {
        let mut albums = Vec::new();
        let mut seen = HashSet::new();
        let mut succeeded = false;
        let mut last_error = None;

        for variant in self.label.query_variants() {
            let query = format!("label:\"{variant}\"");
            match self.api.search_albums(&query, self.settings.album_search_limit) {
                Ok(found) => {
                    succeeded = true;
                    for album in found {
                        if seen.insert(album.id.clone()) {
                            albums.push(album);
                        }
                    }
                }
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => {
                    warn!(%query, %err, "Album search failed");
                    last_error = Some(err);
                }
            }
        }

        if !succeeded {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(albums)
    }

    fn fetch_tracks(&self, albums: &[SimplifiedAlbum]) -> Result<Vec<Track>, ApiError> {
        let budget = self.settings.track_budget;
        let mut tracks: Vec<Track> = Vec::new();
        let mut seen = HashSet::new();

        'albums: for album in albums {
            if tracks.len() >= budget {
                break;
            }

            let listing = match self.api.album_tracks(&album.id) {
                Ok(listing) => listing,
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => {
                    warn!(album = %album.name, %err, "Failed to list album tracks");
                    continue;
                }
            };

            for item in listing {
                if tracks.len() >= budget {
                    break 'albums;
                }
                if let Some(track) = item.into_track(album, self.label.label()) {
                    if seen.insert(track.id.clone()) {
                        tracks.push(track);
                    }
                }
            }
        }

        self.enrich_tracks(&mut tracks)?;
        Ok(tracks)
    }

    /// Fill in preview URLs and artwork from the batch track detail endpoint
    fn enrich_tracks(&self, tracks: &mut [Track]) -> Result<(), ApiError> {
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let mut details: HashMap<String, FullTrack> = HashMap::new();

        for chunk in ids.chunks(MAX_DETAIL_IDS) {
            match self.api.tracks(chunk) {
                Ok(found) => {
                    for full in found {
                        if let Some(id) = full.id.clone() {
                            details.insert(id, full);
                        }
                    }
                }
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => warn!(%err, ids = chunk.len(), "Track detail batch failed"),
            }
        }

        for track in tracks.iter_mut() {
            let Some(full) = details.get(&track.id) else {
                continue;
            };
            if full.preview_url.is_some() {
                track.preview_url = full.preview_url.clone();
            }
            if let Some(url) = full.album.as_ref().and_then(|a| a.image_url()) {
                track.image = url.to_string();
            }
        }
        Ok(())
    }

    /// Unique album artists with their genre tags and popularity
    fn fetch_artists(&self, albums: &[SimplifiedAlbum]) -> Result<Vec<Artist>, ApiError> {
        let mut ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for id in albums
            .iter()
            .flat_map(|album| album.artists.iter())
            .filter_map(|artist| artist.id.clone())
        {
            if ids.len() >= self.settings.artist_budget {
                break;
            }
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        let mut artists = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_DETAIL_IDS) {
            match self.api.artists(chunk) {
                Ok(found) => artists.extend(found.into_iter().map(Artist::from)),
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => warn!(%err, ids = chunk.len(), "Artist detail batch failed"),
            }
        }
        Ok(artists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::cache::{MemoryCacheStore, MockCacheStore};
    use crate::client::MockStreamingApi;
    use crate::models::{FullArtist, Image, SimplifiedArtist, SimplifiedTrack};

    const LABEL: &str = "Dale Play Records";

    fn album(id: &str, artist_id: &str) -> SimplifiedAlbum {
        SimplifiedAlbum {
            id: id.to_string(),
            name: format!("Album {id}"),
            images: vec![],
            artists: vec![SimplifiedArtist {
                id: Some(artist_id.to_string()),
                name: format!("Artist {artist_id}"),
            }],
        }
    }

    fn listing(ids: &[&str]) -> Vec<SimplifiedTrack> {
        ids.iter()
            .map(|id| SimplifiedTrack {
                id: Some(id.to_string()),
                name: format!("Song {id}"),
                artists: vec![SimplifiedArtist {
                    id: Some("ar1".to_string()),
                    name: "Artist ar1".to_string(),
                }],
                duration_ms: 180_000,
                preview_url: None,
                uri: format!("spotify:track:{id}"),
            })
            .collect()
    }

    fn cached_catalog(fetched_at: DateTime<Utc>) -> CatalogCache {
        let track = listing(&["cached"])
            .remove(0)
            .into_track(&album("al0", "ar1"), LABEL)
            .unwrap();
        CatalogCache::new(LABEL, vec![track], vec![], fetched_at)
    }

    fn healthy_api() -> MockStreamingApi {
        let mut api = MockStreamingApi::new();
        api.expect_search_albums()
            .withf(|query, limit| query.starts_with("label:\"") && *limit == 50)
            .times(3)
            .returning(|_, _| Ok(vec![album("al1", "ar1"), album("al2", "ar2")]));
        api.expect_album_tracks().returning(|album_id| match album_id {
            "al1" => Ok(listing(&["t1", "t2", "t3"])),
            _ => Ok(listing(&["t3", "t4"])),
        });
        api.expect_tracks().returning(|ids| {
            Ok(ids
                .iter()
                .map(|id| FullTrack {
                    id: Some(id.clone()),
                    name: format!("Song {id}"),
                    preview_url: Some(format!("https://preview/{id}")),
                    album: Some(SimplifiedAlbum {
                        id: "al".to_string(),
                        name: "Album".to_string(),
                        images: vec![Image {
                            url: "https://art".to_string(),
                        }],
                        artists: vec![],
                    }),
                    ..Default::default()
                })
                .collect())
        });
        api.expect_artists().returning(|ids| {
            Ok(ids
                .iter()
                .map(|id| FullArtist {
                    id: id.clone(),
                    name: format!("Artist {id}"),
                    genres: vec!["trap".to_string()],
                    popularity: 60,
                })
                .collect())
        });
        api
    }

    #[test]
    fn warm_cache_makes_no_catalog_calls() {
        let mut api = MockStreamingApi::new();
        api.expect_search_albums().never();
        api.expect_album_tracks().never();
        api.expect_search_tracks().never();

        let store = MemoryCacheStore::new();
        let now = Utc::now();
        store.put(&cached_catalog(now - Duration::hours(2))).unwrap();
        let label = LabelMatcher::new(LABEL, &[]);

        let provider = CatalogProvider::new(&api, &store, &label, CatalogSettings::default());
        let catalog = provider.load_at(now).unwrap();
        assert_eq!(catalog.tracks[0].id, "cached");
    }

    #[test]
    fn rebuild_deduplicates_enriches_and_stores() {
        let api = healthy_api();
        let store = MemoryCacheStore::new();
        let label = LabelMatcher::new(LABEL, &[]);
        let now = Utc::now();

        let provider = CatalogProvider::new(&api, &store, &label, CatalogSettings::default());
        let catalog = provider.load_at(now).unwrap();

        let ids: Vec<&str> = catalog.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "t4"]);
        assert!(catalog.tracks.iter().all(|t| t.label.as_deref() == Some(LABEL)));
        assert_eq!(catalog.tracks[0].preview_url.as_deref(), Some("https://preview/t1"));
        assert_eq!(catalog.tracks[0].image, "https://art");
        assert_eq!(catalog.artists.len(), 2);

        let stored = store.get().unwrap().unwrap();
        assert_eq!(stored.fetched_at, now);
        assert_eq!(stored.tracks.len(), 4);
    }

    #[test]
    fn expired_cache_is_replaced_wholesale() {
        let api = healthy_api();
        let store = MemoryCacheStore::new();
        let now = Utc::now();
        store.put(&cached_catalog(now - Duration::hours(30))).unwrap();
        let label = LabelMatcher::new(LABEL, &[]);

        let provider = CatalogProvider::new(&api, &store, &label, CatalogSettings::default());
        let catalog = provider.load_at(now).unwrap();

        assert!(catalog.tracks.iter().all(|t| t.id != "cached"));
        assert_eq!(store.get().unwrap().unwrap().fetched_at, now);
    }

    #[test]
    fn track_budget_bounds_the_sample() {
        let api = healthy_api();
        let store = MemoryCacheStore::new();
        let label = LabelMatcher::new(LABEL, &[]);
        let settings = CatalogSettings {
            track_budget: 2,
            ..Default::default()
        };

        let catalog = CatalogProvider::new(&api, &store, &label, settings)
            .refresh()
            .unwrap();
        assert_eq!(catalog.tracks.len(), 2);
    }

    #[test]
    fn failed_rebuild_keeps_previous_cache() {
        let mut api = MockStreamingApi::new();
        api.expect_search_albums()
            .returning(|_, _| Err(ApiError::Unauthorized));

        let store = MemoryCacheStore::new();
        let now = Utc::now();
        let stale = cached_catalog(now - Duration::days(2));
        store.put(&stale).unwrap();
        let label = LabelMatcher::new(LABEL, &[]);

        let provider = CatalogProvider::new(&api, &store, &label, CatalogSettings::default());
        let result = provider.load_at(now);

        assert!(matches!(result, Err(PipelineError::Auth(_))));
        assert_eq!(store.get().unwrap(), Some(stale));
    }

    #[test]
    fn empty_catalog_is_not_cached() {
        let mut api = MockStreamingApi::new();
        api.expect_search_albums().returning(|_, _| Ok(vec![]));
        api.expect_tracks().returning(|_| Ok(vec![]));
        api.expect_artists().returning(|_| Ok(vec![]));

        let mut store = MockCacheStore::new();
        store.expect_get().returning(|| Ok(None));
        store.expect_put().never();
        let label = LabelMatcher::new(LABEL, &[]);

        let catalog = CatalogProvider::new(&api, &store, &label, CatalogSettings::default())
            .load()
            .unwrap();
        assert!(catalog.tracks.is_empty());
    }

    #[test]
    fn skips_failing_album_but_aborts_on_rate_limit() {
        let mut api = MockStreamingApi::new();
        api.expect_search_albums()
            .returning(|_, _| Ok(vec![album("bad", "ar1"), album("al1", "ar1")]));
        api.expect_album_tracks().returning(|album_id| match album_id {
            "bad" => Err(ApiError::Status {
                status: 500,
                body: String::new(),
            }),
            _ => Ok(listing(&["t1"])),
        });
        api.expect_tracks().returning(|_| Ok(vec![]));
        api.expect_artists()
            .returning(|_| Err(ApiError::RateLimitExhausted(4)));

        let store = MemoryCacheStore::new();
        let label = LabelMatcher::new(LABEL, &[]);
        let result = CatalogProvider::new(&api, &store, &label, CatalogSettings::default()).refresh();

        assert!(matches!(result, Err(PipelineError::RateLimited(_))));
        assert!(store.get().unwrap().is_none());
    }
}
