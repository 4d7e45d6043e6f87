use crate::catalog::LabelMatcher;
use crate::client::StreamingApi;
use crate::deadline::Deadline;
use crate::error::{ApiError, PipelineError};
use crate::models::{FullTrack, Track, TrackQuery, names_overlap};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

const SEARCH_LIMIT: u32 = 5;

/// Resolves model-named songs to catalog tracks whose album is verified to belong to the label
pub struct TrackResolver<'a> {
    api: &'a dyn StreamingApi,
    label: &'a LabelMatcher,
    delay: Duration,
    deadline: Deadline,
}

impl<'a> TrackResolver<'a> {
    pub fn new(api: &'a dyn StreamingApi, label: &'a LabelMatcher, delay: Duration) -> Self {
        Self {
            api,
            label,
            delay,
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Resolve the queries one at a time, waiting `delay` between them.
    /// Unresolved or unverifiable songs are omitted; the result keeps input order.
    pub fn resolve(
        &self,
        queries: &[TrackQuery],
        mut sleep: impl FnMut(Duration),
    ) -> Result<Vec<Track>, PipelineError> {
        let valid: Vec<&TrackQuery> = queries
            .iter()
            .filter(|query| {
                if !query.is_valid() {
                    warn!(track = %query.track_name, artist = %query.artist_name, "Skipping incomplete track suggestion");
                }
                query.is_valid()
            })
            .collect();

        let mut album_labels: HashMap<String, Option<String>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for (index, query) in valid.iter().enumerate() {
            if index > 0 {
                sleep(self.delay);
            }
            if self.deadline.expired() {
                warn!(
                    resolved = resolved.len(),
                    skipped = valid.len() - index,
                    "Deadline reached while resolving tracks, returning partial result"
                );
                break;
            }

            match self.resolve_one(query, &mut album_labels) {
                Ok(Some(track)) => {
                    debug!(track = %track.name, artist = %track.artist, "Resolved track");
                    if seen.insert(track.id.clone()) {
                        resolved.push(track);
                    }
                }
                Ok(None) => debug!(track = %query.track_name, artist = %query.artist_name, "No verified match"),
                Err(err) if err.is_terminal() => return Err(err.into()),
                Err(err) => warn!(%err, track = %query.track_name, "Track lookup failed, skipping"),
            }
        }

        info!(requested = queries.len(), resolved = resolved.len(), "Resolved suggested tracks");
        Ok(resolved)
    }

    fn resolve_one(
        &self,
        query: &TrackQuery,
        album_labels: &mut HashMap<String, Option<String>>,
    ) -> Result<Option<Track>, ApiError> {
        let name = query.track_name.trim().replace('"', "");
        let artist = query.artist_name.trim().replace('"', "");

        let mut results = self
            .api
            .search_tracks(&format!("track:\"{name}\" artist:\"{artist}\""), SEARCH_LIMIT)?;
        if results.is_empty() {
            debug!(track = %name, "Exact search empty, retrying by track name");
            results = self.api.search_tracks(&format!("track:\"{name}\""), SEARCH_LIMIT)?;
        }

        let by_artist: Vec<&FullTrack> = results
            .iter()
            .filter(|candidate| candidate.artists.iter().any(|a| names_overlap(&a.name, &artist)))
            .collect();
        let ranked: Vec<&FullTrack> = if by_artist.is_empty() {
            results.iter().collect()
        } else {
            by_artist
        };

        for candidate in ranked {
            let Some(album) = &candidate.album else {
                continue;
            };
            let label = match album_labels.get(&album.id) {
                Some(label) => label.clone(),
                None => {
                    let label = match self.api.album(&album.id) {
                        Ok(detail) => detail.label,
                        Err(err) if err.is_terminal() => return Err(err),
                        Err(err) => {
                            warn!(%err, album = %album.name, "Album lookup failed, candidate unverified");
                            None
                        }
                    };
                    album_labels.insert(album.id.clone(), label.clone());
                    label
                }
            };

            match label {
                Some(label) if self.label.matches(&label) => {
                    match candidate.clone().into_track(Some(label)) {
                        Some(track) => return Ok(Some(track)),
                        None => debug!(album = %album.name, "Verified candidate has no track id"),
                    }
                }
                other => debug!(album = %album.name, label = ?other, "Album outside the label"),
            }
        }
        Ok(None)
    }
}
