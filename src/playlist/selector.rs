use super::config::{SelectionConfig, TempoPolicy};
use super::filters::TrackFilters;
use super::shuffle::shuffle_rng;
use crate::catalog::LabelMatcher;
use crate::client::{MAX_AUDIO_FEATURE_IDS, StreamingApi};
use crate::deadline::Deadline;
use crate::error::{AppliedConstraints, PipelineError};
use crate::models::{Artist, BpmRange, SelectionCriteria, Track};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Final ordered tracks and the constraints that produced them
#[derive(Debug, Clone)]
pub struct Selection {
    pub tracks: Vec<Track>,
    pub applied: AppliedConstraints,
}

/// Turns a candidate pool and criteria into the final playlist order:
/// filter, rank, diversify, backfill.
pub struct TrackSelector<'a> {
    api: &'a dyn StreamingApi,
    label: &'a LabelMatcher,
    config: &'a SelectionConfig,
    deadline: Deadline,
}

fn artist_key(track: &Track) -> String {
    track.artist.trim().to_lowercase()
}

/// Sliding window of recent artists plus running per-artist counts
struct DiversityState {
    window: usize,
    cap: usize,
    recent: VecDeque<String>,
    counts: HashMap<String, usize>,
}

impl DiversityState {
    fn new(window: usize, cap: usize) -> Self {
        Self {
            window,
            cap,
            recent: VecDeque::with_capacity(window),
            counts: HashMap::new(),
        }
    }

    /// Every slot of a full window already holds this artist
    fn fills_window(&self, artist: &str) -> bool {
        self.window > 0
            && self.recent.len() >= self.window
            && self.recent.iter().all(|recent| recent == artist)
    }

    fn allows(&self, artist: &str) -> bool {
        let count = self.counts.get(artist).copied().unwrap_or(0);
        count < self.cap && !self.fills_window(artist)
    }

    fn record(&mut self, artist: String) {
        if self.window > 0 {
            if self.recent.len() == self.window {
                self.recent.pop_front();
            }
            self.recent.push_back(artist.clone());
        }
        *self.counts.entry(artist).or_insert(0) += 1;
    }
}

impl<'a> TrackSelector<'a> {
    pub fn new(api: &'a dyn StreamingApi, label: &'a LabelMatcher, config: &'a SelectionConfig) -> Self {
        Self {
            api,
            label,
            config,
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Select up to `criteria.max_tracks` tracks from the candidates.
    /// `seed_text` makes the shuffle reproducible for the same text.
    pub fn select(
        &self,
        candidates: Vec<Track>,
        artists: &[Artist],
        criteria: &SelectionCriteria,
        seed_text: Option<&str>,
    ) -> Result<Selection, PipelineError> {
        let mut applied = AppliedConstraints {
            genres: criteria.genres.clone(),
            artists: criteria.artists.clone(),
            excluded_genres: criteria.exclude_genres.clone(),
            bpm_range: criteria.bpm_range,
            max_tracks: criteria.max_tracks,
            ..Default::default()
        };

        let pool = TrackFilters::label_members(TrackFilters::dedup_by_id(candidates), self.label);
        applied.candidate_count = pool.len();

        let pool = TrackFilters::rank_by_genre(pool, artists, &criteria.genres);
        let pool = TrackFilters::without_excluded_genres(pool, artists, &criteria.exclude_genres);
        let mut pool = TrackFilters::matching_artists(pool, &criteria.artists);
        debug!(remaining = pool.len(), "Candidates after genre and artist filters");

        if let Some(range) = criteria.bpm_range {
            let (filtered, relaxed) = self.filter_by_tempo(pool, &range)?;
            pool = filtered;
            applied.relaxed_tempo = relaxed;
        }

        if pool.is_empty() {
            warn!(%applied, "No tracks left after filtering");
            return Err(PipelineError::NoMatchingTracks(applied));
        }

        let mut rng = shuffle_rng(seed_text);
        pool.shuffle(&mut rng);

        let cap = self.config.artist_cap_for(criteria.max_tracks);
        let mut tracks = self.diversify(&pool, criteria.max_tracks, cap);
        let diverse = tracks.len();
        Self::backfill(&mut tracks, &pool, criteria.max_tracks);
        if tracks.len() > diverse {
            debug!(diverse, backfilled = tracks.len() - diverse, "Backfilled past diversity limits");
        }

        if self.config.final_shuffle {
            tracks = self.arrange(tracks, &mut rng);
        }

        info!(
            selected = tracks.len(),
            requested = criteria.max_tracks,
            pool = pool.len(),
            "Selected tracks"
        );
        Ok(Selection { tracks, applied })
    }

    /// Fill in tempos, then apply the configured tempo policy.
    /// Returns the kept tracks and whether unknown tempos were let through.
    fn filter_by_tempo(
        &self,
        tracks: Vec<Track>,
        range: &BpmRange,
    ) -> Result<(Vec<Track>, bool), PipelineError> {
        let tracks = self.with_tempos(tracks)?;

        let strict: Vec<Track> = tracks
            .iter()
            .filter(|t| TrackFilters::within_bpm(t, range))
            .cloned()
            .collect();
        debug!(kept = strict.len(), total = tracks.len(), bpm = %range, "Applied tempo filter");

        if !strict.is_empty() || self.config.tempo_policy == TempoPolicy::Strict {
            return Ok((strict, false));
        }

        let relaxed: Vec<Track> = tracks
            .into_iter()
            .filter(|t| TrackFilters::not_outside_bpm(t, range))
            .collect();
        if !relaxed.is_empty() {
            warn!(kept = relaxed.len(), bpm = %range, "No track has a known tempo in range, keeping unknown tempos");
        }
        let was_relaxed = !relaxed.is_empty();
        Ok((relaxed, was_relaxed))
    }

    /// Look up tempos for tracks that do not carry one yet, in service-sized batches.
    /// Stops early at the deadline, leaving the rest unknown.
    fn with_tempos(&self, mut tracks: Vec<Track>) -> Result<Vec<Track>, PipelineError> {
        let missing: Vec<String> = tracks
            .iter()
            .filter(|t| t.tempo.is_none())
            .map(|t| t.id.clone())
            .collect();

        let mut tempos: HashMap<String, f64> = HashMap::new();
        let mut batches = missing.chunks(MAX_AUDIO_FEATURE_IDS).enumerate();
        while let Some((index, batch)) = batches.next() {
            if self.deadline.expired() {
                let remaining_ids = batch.len() + batches.by_ref().map(|(_, rest)| rest.len()).sum::<usize>();
                warn!(
                    fetched_batches = index,
                    remaining_ids,
                    "Deadline reached while fetching tempos"
                );
                break;
            }
            match self.api.audio_features(batch) {
                Ok(features) => {
                    for feature in features {
                        if let Some(tempo) = feature.tempo {
                            tempos.insert(feature.id, tempo);
                        }
                    }
                }
                Err(err) if err.is_terminal() => return Err(err.into()),
                Err(err) => warn!(%err, batch = batch.len(), "Tempo lookup failed, leaving tempos unknown"),
            }
        }

        for track in tracks.iter_mut().filter(|t| t.tempo.is_none()) {
            track.tempo = tempos.get(&track.id).copied();
        }
        Ok(tracks)
    }

    /// Greedy pass honoring the artist window and per-artist cap
    fn diversify(&self, pool: &[Track], max_tracks: usize, cap: usize) -> Vec<Track> {
        let mut state = DiversityState::new(self.config.diversity_window, cap);
        let mut picked = Vec::with_capacity(max_tracks.min(pool.len()));

        for track in pool {
            if picked.len() >= max_tracks {
                break;
            }
            let artist = artist_key(track);
            if state.allows(&artist) {
                state.record(artist);
                picked.push(track.clone());
            }
        }
        picked
    }

    /// Append unpicked pool tracks in order until the target is met
    fn backfill(picked: &mut Vec<Track>, pool: &[Track], max_tracks: usize) {
        let mut seen: HashSet<String> = picked.iter().map(|t| t.id.clone()).collect();
        for track in pool {
            if picked.len() >= max_tracks {
                break;
            }
            if seen.insert(track.id.clone()) {
                picked.push(track.clone());
            }
        }
    }

    /// Reshuffle, then reorder so no artist runs past the window where the mix allows it
    fn arrange(&self, mut tracks: Vec<Track>, rng: &mut impl Rng) -> Vec<Track> {
        tracks.shuffle(rng);

        let window = self.config.diversity_window;
        if window == 0 {
            return tracks;
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for track in &tracks {
            *counts.entry(artist_key(track)).or_insert(0) += 1;
        }

        let mut remaining = tracks;
        let mut ordered: Vec<Track> = Vec::with_capacity(remaining.len());
        let mut run: Option<(String, usize)> = None;

        while !remaining.is_empty() {
            let keys: Vec<String> = remaining.iter().map(artist_key).collect();
            let allowed = |key: &str| {
                run.as_ref()
                    .is_none_or(|(artist, length)| artist != key || *length < window)
            };
            let position = keys
                .iter()
                .position(|key| allowed(key.as_str()) && Self::stays_arrangeable(&counts, key, run.as_ref(), window))
                .or_else(|| keys.iter().position(|key| allowed(key.as_str())))
                .unwrap_or(0);

            let track = remaining.remove(position);
            let key = artist_key(&track);
            if let Some(count) = counts.get_mut(&key) {
                *count = count.saturating_sub(1);
            }
            run = match run {
                Some((artist, length)) if artist == key => Some((artist, length + 1)),
                _ => Some((key, 1)),
            };
            ordered.push(track);
        }
        ordered
    }

    /// Whether, after placing a track by `next`, the rest can still be ordered
    /// without any artist running longer than `window`
    fn stays_arrangeable(
        counts: &HashMap<String, usize>,
        next: &str,
        run: Option<&(String, usize)>,
        window: usize,
    ) -> bool {
        let run_length = match run {
            Some((artist, length)) if artist == next => length + 1,
            _ => 1,
        };
        let total = counts.values().sum::<usize>().saturating_sub(1);

        counts.iter().all(|(artist, &count)| {
            let is_next = artist == next;
            let count = if is_next { count.saturating_sub(1) } else { count };
            let others = total - count;
            let head_room = if is_next { window.saturating_sub(run_length) } else { window };
            count <= head_room + window * others
        })
    }
}
