use crate::catalog::LabelMatcher;
use crate::models::{Artist, BpmRange, Track, names_overlap};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Artists picked out by a genre query, matched against tracks by id or by name
#[derive(Debug, Default)]
pub struct ArtistSet {
    ids: HashSet<String>,
    names: Vec<String>,
}

impl ArtistSet {
    pub fn with_genres(artists: &[Artist], genres: &[String]) -> Self {
        let mut set = ArtistSet::default();
        for artist in artists.iter().filter(|a| a.matches_any_genre(genres)) {
            set.ids.insert(artist.id.clone());
            set.names.push(artist.name.clone());
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, track: &Track) -> bool {
        match &track.artist_id {
            Some(id) => self.ids.contains(id),
            None => self.names.iter().any(|name| names_overlap(name, &track.artist)),
        }
    }
}

/// Track filtering functionality using static helper functions
pub struct TrackFilters;

impl TrackFilters {
    /// Drop repeated track ids, keeping the first occurrence
    pub fn dedup_by_id(tracks: Vec<Track>) -> Vec<Track> {
        let mut seen = HashSet::new();
        tracks
            .into_iter()
            .filter(|track| seen.insert(track.id.clone()))
            .collect()
    }

    /// Keep only tracks attributed to the target label
    pub fn label_members(tracks: Vec<Track>, label: &LabelMatcher) -> Vec<Track> {
        let before = tracks.len();
        let kept: Vec<Track> = tracks.into_iter().filter(|t| label.is_member(t)).collect();
        if kept.len() < before {
            debug!(dropped = before - kept.len(), "Dropped tracks outside the label");
        }
        kept
    }

    /// Stable partition: tracks by genre-matching artists first, relative order kept in both groups
    pub fn rank_by_genre(tracks: Vec<Track>, artists: &[Artist], genres: &[String]) -> Vec<Track> {
        if genres.is_empty() {
            return tracks;
        }

        let matching = ArtistSet::with_genres(artists, genres);
        let (mut preferred, rest): (Vec<Track>, Vec<Track>) =
            tracks.into_iter().partition(|track| matching.contains(track));
        debug!(preferred = preferred.len(), rest = rest.len(), "Ranked tracks by genre");
        preferred.extend(rest);
        preferred
    }

    /// Drop tracks by artists tagged with an excluded genre, unless that would drop everything
    pub fn without_excluded_genres(
        tracks: Vec<Track>,
        artists: &[Artist],
        excluded: &[String],
    ) -> Vec<Track> {
        if excluded.is_empty() {
            return tracks;
        }

        let excluded_artists = ArtistSet::with_genres(artists, excluded);
        if excluded_artists.is_empty() {
            return tracks;
        }

        let kept: Vec<Track> = tracks
            .iter()
            .filter(|track| !excluded_artists.contains(track))
            .cloned()
            .collect();
        if kept.is_empty() {
            warn!(excluded = ?excluded, "Excluding genres would leave no tracks, ignoring the exclusion");
            return tracks;
        }
        kept
    }

    /// Keep only tracks whose artist matches one of the requested names
    pub fn matching_artists(tracks: Vec<Track>, wanted: &[String]) -> Vec<Track> {
        if wanted.is_empty() {
            return tracks;
        }
        tracks
            .into_iter()
            .filter(|track| wanted.iter().any(|name| track.artist_matches(name)))
            .collect()
    }

    /// Known tempo inside the range
    pub fn within_bpm(track: &Track, range: &BpmRange) -> bool {
        track.tempo.is_some_and(|tempo| range.contains(tempo))
    }

    /// Unknown tempo, or a known tempo inside the range
    pub fn not_outside_bpm(track: &Track, range: &BpmRange) -> bool {
        track.tempo.is_none_or(|tempo| range.contains(tempo))
    }
}
