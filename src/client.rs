use crate::config::Config;
use crate::error::ApiError;
use crate::models::{
    AlbumDetail, ArtistsResponse, AudioFeatures, AudioFeaturesResponse, CreatedPlaylist,
    FullArtist, FullTrack, Paging, SearchAlbumsResponse, SearchTracksResponse, SimplifiedAlbum,
    SimplifiedTrack, TracksResponse,
};
use crate::rate_limit::{RetryPolicy, parse_retry_after, with_retry};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use urlencoding::encode;

/// Service limit for batch track and artist detail lookups
pub const MAX_DETAIL_IDS: usize = 50;
/// Service limit for batch audio-feature lookups
pub const MAX_AUDIO_FEATURE_IDS: usize = 100;
/// Service limit for adding tracks to a playlist in one request
pub const MAX_PLAYLIST_ADD: usize = 100;

/// The slice of the streaming catalog API the pipeline depends on.
/// Batch methods expect callers to respect the service limits above.
#[cfg_attr(test, mockall::automock)]
pub trait StreamingApi: Send + Sync {
    fn search_albums(&self, query: &str, limit: u32) -> Result<Vec<SimplifiedAlbum>, ApiError>;

    fn album_tracks(&self, album_id: &str) -> Result<Vec<SimplifiedTrack>, ApiError>;

    fn tracks(&self, ids: &[String]) -> Result<Vec<FullTrack>, ApiError>;

    fn artists(&self, ids: &[String]) -> Result<Vec<FullArtist>, ApiError>;

    fn audio_features(&self, ids: &[String]) -> Result<Vec<AudioFeatures>, ApiError>;

    fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<FullTrack>, ApiError>;

    fn album(&self, album_id: &str) -> Result<AlbumDetail, ApiError>;

    fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, ApiError>;

    fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError>;
}

/// A blocking Spotify Web API client using a bearer access token
pub struct SpotifyClient {
    agent: Agent,
    base_url: String,
    access_token: String,
    market: String,
    retry: RetryPolicy,
}

impl SpotifyClient {
    /// Create a new client with configuration from environment
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();

        SpotifyClient {
            agent,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            market: config.market.clone(),
            retry: RetryPolicy::default(),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// GET a JSON document, retrying throttled responses
    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        with_retry(&self.retry, std::thread::sleep, || {
            let response = self
                .agent
                .get(&url)
                .set("Authorization", &self.bearer())
                .call();
            Self::read_json(response)
        })
    }

    /// POST a JSON body and decode the JSON reply, retrying throttled responses
    fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        with_retry(&self.retry, std::thread::sleep, || {
            let response = self
                .agent
                .post(&url)
                .set("Authorization", &self.bearer())
                .send_json(body.clone());
            Self::read_json(response)
        })
    }

    fn read_json<T: DeserializeOwned>(
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<T, ApiError> {
        match result {
            Ok(response) => response
                .into_json::<T>()
                .map_err(|e| ApiError::Decode(e.to_string())),
            Err(ureq::Error::Status(401, _)) => Err(ApiError::Unauthorized),
            Err(ureq::Error::Status(429, response)) => Err(ApiError::RateLimited {
                retry_after: response.header("Retry-After").and_then(parse_retry_after),
            }),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(ApiError::Status { status, body })
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(ApiError::Transport(transport.to_string()))
            }
        }
    }
}

impl StreamingApi for SpotifyClient {
    fn search_albums(&self, query: &str, limit: u32) -> Result<Vec<SimplifiedAlbum>, ApiError> {
        let path = format!(
            "/search?q={}&type=album&limit={}&market={}",
            encode(query),
            limit,
            self.market
        );
        let response: SearchAlbumsResponse = self.get_json(&path)?;
        Ok(response.albums.items)
    }

    fn album_tracks(&self, album_id: &str) -> Result<Vec<SimplifiedTrack>, ApiError> {
        let path = format!(
            "/albums/{}/tracks?limit=50&market={}",
            encode(album_id),
            self.market
        );
        let response: Paging<SimplifiedTrack> = self.get_json(&path)?;
        Ok(response.items)
    }

    fn tracks(&self, ids: &[String]) -> Result<Vec<FullTrack>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/tracks?ids={}&market={}", ids.join(","), self.market);
        let response: TracksResponse = self.get_json(&path)?;
        Ok(response.tracks.into_iter().flatten().collect())
    }

    fn artists(&self, ids: &[String]) -> Result<Vec<FullArtist>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/artists?ids={}", ids.join(","));
        let response: ArtistsResponse = self.get_json(&path)?;
        Ok(response.artists.into_iter().flatten().collect())
    }

    fn audio_features(&self, ids: &[String]) -> Result<Vec<AudioFeatures>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/audio-features?ids={}", ids.join(","));
        let response: AudioFeaturesResponse = self.get_json(&path)?;
        Ok(response.audio_features.into_iter().flatten().collect())
    }

    fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<FullTrack>, ApiError> {
        let path = format!(
            "/search?q={}&type=track&limit={}&market={}",
            encode(query),
            limit,
            self.market
        );
        let response: SearchTracksResponse = self.get_json(&path)?;
        Ok(response.tracks.items)
    }

    fn album(&self, album_id: &str) -> Result<AlbumDetail, ApiError> {
        let path = format!("/albums/{}?market={}", encode(album_id), self.market);
        self.get_json(&path)
    }

    fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, ApiError> {
        let body = serde_json::json!({
            "name": name,
            "description": description,
            "public": public,
        });
        self.post_json(&format!("/users/{}/playlists", encode(user_id)), &body)
    }

    fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let body = serde_json::json!({ "uris": uris });
        let _snapshot: serde_json::Value =
            self.post_json(&format!("/playlists/{}/tracks", encode(playlist_id)), &body)?;
        Ok(())
    }
}
