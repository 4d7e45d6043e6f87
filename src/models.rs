use serde::{Deserialize, Serialize};
use std::fmt;

/// Artwork used when neither the track nor its album carries an image
pub const DEFAULT_IMAGE: &str = "/icon.png";

/// A catalog track. Identity is the catalog id; `tempo` is filled in lazily
/// by the selector when a BPM range is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub artist_id: Option<String>,
    pub album: String,
    #[serde(default)]
    pub album_id: Option<String>,
    pub image: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub preview_url: Option<String>,
    pub uri: String,
    /// Label the track was attributed to when it entered the candidate set
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub tempo: Option<f64>,
}

impl Track {
    /// Case-insensitive, bidirectional substring match against an artist name
    pub fn artist_matches(&self, wanted: &str) -> bool {
        names_overlap(&self.artist, wanted)
    }
}

/// Label artist. Only used for genre and diversity matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: u32,
}

impl Artist {
    /// Check if any of this artist's genre tags overlaps one of the given genres
    pub fn matches_any_genre(&self, wanted: &[String]) -> bool {
        self.genres
            .iter()
            .any(|genre| wanted.iter().any(|w| names_overlap(genre, w)))
    }
}

/// Bidirectional, case-insensitive substring containment. Empty strings never match.
pub fn names_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Inclusive tempo window, serialized as `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct BpmRange {
    pub min: f64,
    pub max: f64,
}

impl BpmRange {
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    pub fn contains(&self, tempo: f64) -> bool {
        tempo >= self.min && tempo <= self.max
    }
}

impl From<[f64; 2]> for BpmRange {
    fn from(bounds: [f64; 2]) -> Self {
        BpmRange::new(bounds[0], bounds[1])
    }
}

impl From<BpmRange> for [f64; 2] {
    fn from(range: BpmRange) -> Self {
        [range.min, range.max]
    }
}

impl fmt::Display for BpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Energy {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tempo {
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Upbeat,
    Mellow,
}

impl Energy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(Energy::High),
            "medium" => Some(Energy::Medium),
            "low" => Some(Energy::Low),
            _ => None,
        }
    }
}

impl Tempo {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fast" => Some(Tempo::Fast),
            "medium" => Some(Tempo::Medium),
            "slow" => Some(Tempo::Slow),
            _ => None,
        }
    }
}

impl Mood {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "upbeat" => Some(Mood::Upbeat),
            "mellow" => Some(Mood::Mellow),
            _ => None,
        }
    }
}

/// Structured parameters steering track selection. Produced once per prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    pub playlist_name: String,
    pub description: String,
    pub genres: Vec<String>,
    pub energy: Option<Energy>,
    pub tempo: Option<Tempo>,
    pub mood: Option<Mood>,
    pub artists: Vec<String>,
    pub exclude_genres: Vec<String>,
    pub max_tracks: usize,
    pub bpm_range: Option<BpmRange>,
}

pub const MAX_CRITERIA_GENRES: usize = 5;
pub const MAX_CRITERIA_ARTISTS: usize = 3;

/// Preferred energy, tempo and mood of a listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicPreferences {
    pub energy: Energy,
    pub tempo: Tempo,
    pub mood: Mood,
}

impl Default for MusicPreferences {
    fn default() -> Self {
        Self {
            energy: Energy::Medium,
            tempo: Tempo::Medium,
            mood: Mood::Upbeat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteArtist {
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Listener taste context handed to the language model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasteProfile {
    pub top_genres: Vec<String>,
    pub favorite_artists: Vec<FavoriteArtist>,
    pub preferences: MusicPreferences,
}

impl TasteProfile {
    /// Build a taste profile out of the label's own artists, keeping genre order of first appearance
    pub fn from_artists(artists: &[Artist]) -> Self {
        let mut top_genres: Vec<String> = Vec::new();
        for artist in artists {
            for genre in &artist.genres {
                if !top_genres.contains(genre) {
                    top_genres.push(genre.clone());
                }
            }
        }

        TasteProfile {
            top_genres,
            favorite_artists: artists
                .iter()
                .map(|a| FavoriteArtist {
                    name: a.name.clone(),
                    genres: a.genres.clone(),
                })
                .collect(),
            preferences: MusicPreferences::default(),
        }
    }
}

/// A song named by a language model, to be resolved against the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackQuery {
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub artist_name: String,
}

impl TrackQuery {
    pub fn new(track_name: &str, artist_name: &str) -> Self {
        Self {
            track_name: track_name.to_string(),
            artist_name: artist_name.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.track_name.trim().is_empty() && !self.artist_name.trim().is_empty()
    }
}

// Spotify Web API wire structures

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u32>,
}

impl<T> Default for Paging<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimplifiedArtist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimplifiedAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
}

impl SimplifiedAlbum {
    pub fn image_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }
}

/// Track entry from an album listing (no album object attached)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimplifiedTrack {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub uri: String,
}

impl SimplifiedTrack {
    /// Convert an album listing entry into a catalog track attributed to `label`
    pub fn into_track(self, album: &SimplifiedAlbum, label: &str) -> Option<Track> {
        let id = self.id?;
        let (artist, artist_id) = primary_artist(&self.artists);
        Some(Track {
            id,
            name: self.name,
            artist,
            artist_id,
            album: album.name.clone(),
            album_id: Some(album.id.clone()),
            image: album.image_url().unwrap_or(DEFAULT_IMAGE).to_string(),
            duration_ms: self.duration_ms,
            preview_url: self.preview_url,
            uri: self.uri,
            label: Some(label.to_string()),
            tempo: None,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullTrack {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    #[serde(default)]
    pub album: Option<SimplifiedAlbum>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub uri: String,
}

impl FullTrack {
    pub fn into_track(self, label: Option<String>) -> Option<Track> {
        let id = self.id?;
        let (artist, artist_id) = primary_artist(&self.artists);
        let (album, album_id, image) = match &self.album {
            Some(album) => (
                album.name.clone(),
                Some(album.id.clone()),
                album.image_url().unwrap_or(DEFAULT_IMAGE).to_string(),
            ),
            None => ("Unknown".to_string(), None, DEFAULT_IMAGE.to_string()),
        };
        Some(Track {
            id,
            name: self.name,
            artist,
            artist_id,
            album,
            album_id,
            image,
            duration_ms: self.duration_ms,
            preview_url: self.preview_url,
            uri: self.uri,
            label,
            tempo: None,
        })
    }
}

fn primary_artist(artists: &[SimplifiedArtist]) -> (String, Option<String>) {
    match artists.first() {
        Some(a) => (a.name.clone(), a.id.clone()),
        None => ("Unknown".to_string(), None),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchAlbumsResponse {
    #[serde(default)]
    pub albums: Paging<SimplifiedAlbum>,
}

#[derive(Debug, Deserialize)]
pub struct SearchTracksResponse {
    #[serde(default)]
    pub tracks: Paging<FullTrack>,
}

#[derive(Debug, Deserialize)]
pub struct TracksResponse {
    #[serde(default)]
    pub tracks: Vec<Option<FullTrack>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: u32,
}

impl From<FullArtist> for Artist {
    fn from(a: FullArtist) -> Self {
        Artist {
            id: a.id,
            name: a.name,
            genres: a.genres,
            popularity: a.popularity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArtistsResponse {
    #[serde(default)]
    pub artists: Vec<Option<FullArtist>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    #[serde(default)]
    pub tempo: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AudioFeaturesResponse {
    #[serde(default)]
    pub audio_features: Vec<Option<AudioFeatures>>,
}

/// Full album object; the only source of the `label` field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumDetail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// Response structure for the create-playlist call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
}
