use super::config::{SelectionConfig, StrategyKind};
use super::resolver::TrackResolver;
use super::selector::TrackSelector;
use crate::catalog::{CatalogCache, CatalogProvider, LabelMatcher};
use crate::client::StreamingApi;
use crate::deadline::Deadline;
use crate::error::{AppliedConstraints, PipelineError};
use crate::llm::{CriteriaContext, CriteriaGenerator, LanguageModel, Plan};
use crate::models::{SelectionCriteria, TasteProfile, Track};
use crate::prompt::{ActivityTable, validate_prompt};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// One playlist request: the prompt plus whatever context the caller already holds
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Previously loaded catalog; loaded through the provider when absent
    pub catalog: Option<CatalogCache>,
    /// Listener taste; derived from the label's artists when absent
    pub taste: Option<TasteProfile>,
}

#[derive(Debug, Clone)]
pub struct GeneratedPlaylist {
    pub name: String,
    pub description: String,
    pub tracks: Vec<Track>,
    pub criteria: SelectionCriteria,
    pub applied: AppliedConstraints,
    /// Strategy that actually produced the tracks, after any degradation
    pub strategy: StrategyKind,
    pub warnings: Vec<String>,
}

/// Main playlist generator: prompt in, label-restricted ordered playlist out
pub struct PlaylistGenerator<'a> {
    api: &'a dyn StreamingApi,
    catalog: &'a CatalogProvider<'a>,
    model: &'a dyn LanguageModel,
    label: &'a LabelMatcher,
    activities: &'a ActivityTable,
    config: &'a SelectionConfig,
    deadline: Deadline,
}

impl<'a> PlaylistGenerator<'a> {
    pub fn new(
        api: &'a dyn StreamingApi,
        catalog: &'a CatalogProvider<'a>,
        model: &'a dyn LanguageModel,
        label: &'a LabelMatcher,
        activities: &'a ActivityTable,
        config: &'a SelectionConfig,
    ) -> Self {
        Self {
            api,
            catalog,
            model,
            label,
            activities,
            config,
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn generate(&self, request: GenerationRequest) -> Result<GeneratedPlaylist, PipelineError> {
        self.generate_with_sleep(request, std::thread::sleep)
    }

    /// Run the whole pipeline; `sleep` paces the sequential track resolution
    pub fn generate_with_sleep(
        &self,
        request: GenerationRequest,
        sleep: impl FnMut(Duration),
    ) -> Result<GeneratedPlaylist, PipelineError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::InvalidInput("the prompt is empty".to_string()));
        }

        let parser = self.config.duration_parser();
        let validation = validate_prompt(
            prompt,
            self.activities,
            &parser,
            self.config.require_activity_and_duration,
        );
        if !validation.is_valid() {
            return Err(PipelineError::InvalidInput(validation.errors.join("; ")));
        }

        let duration = parser.parse(prompt);
        let activity = self.activities.match_prompt(prompt, None);
        info!(
            requested = ?duration.requested_minutes,
            minutes = duration.effective_minutes,
            tracks = duration.track_count,
            activity = activity.as_ref().map(|a| a.activity.as_str()),
            bpm = ?activity.as_ref().map(|a| a.bpm),
            "Parsed prompt"
        );

        let catalog = match request.catalog {
            Some(catalog) => catalog,
            None => self.catalog.load()?,
        };
        let taste = request
            .taste
            .unwrap_or_else(|| TasteProfile::from_artists(&catalog.artists));
        let label_genres = catalog.genres();
        let label_artists: Vec<String> = catalog.artists.iter().map(|a| a.name.clone()).collect();

        let ctx = CriteriaContext {
            prompt,
            activity: activity.as_ref(),
            track_count: duration.track_count,
            taste: &taste,
            label: self.label.label(),
            label_genres: &label_genres,
            label_artists: &label_artists,
        };

        let criteria_generator = CriteriaGenerator::new(self.model);
        let plan = criteria_generator.plan(self.config.strategy, &ctx, &catalog.tracks);
        let (strategy, criteria, candidates) = match plan {
            Plan::Criteria(criteria) => (StrategyKind::Criteria, criteria, catalog.tracks.clone()),
            Plan::SpecificTracks { criteria, queries } => {
                let resolved = TrackResolver::new(self.api, self.label, self.config.resolver_delay())
                    .with_deadline(self.deadline)
                    .resolve(&queries, sleep)?;
                if resolved.is_empty() {
                    warn!("None of the suggested tracks were verified, falling back to criteria");
                    (StrategyKind::Criteria, criteria_generator.generate(&ctx), catalog.tracks.clone())
                } else {
                    (StrategyKind::SpecificTracks, criteria, resolved)
                }
            }
            Plan::CatalogPick { criteria, track_ids } => {
                let by_id: HashMap<&str, &Track> =
                    catalog.tracks.iter().map(|t| (t.id.as_str(), t)).collect();
                let picked: Vec<Track> = track_ids
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()).map(|t| (*t).clone()))
                    .collect();
                (StrategyKind::CatalogPick, criteria, picked)
            }
        };

        let seed = self.config.seeded_shuffle.then_some(prompt);
        let selection = TrackSelector::new(self.api, self.label, self.config)
            .with_deadline(self.deadline)
            .select(candidates, &catalog.artists, &criteria, seed)?;

        if self.deadline.expired() {
            warn!(tracks = selection.tracks.len(), "Deadline passed during generation, result may be partial");
        }

        let mut warnings = validation.warnings;
        if selection.applied.relaxed_tempo {
            warnings.push("Some tracks have no tempo data; the tempo filter was relaxed".to_string());
        }

        info!(
            name = %criteria.playlist_name,
            %strategy,
            tracks = selection.tracks.len(),
            "Generated playlist"
        );
        Ok(GeneratedPlaylist {
            name: criteria.playlist_name.clone(),
            description: criteria.description.clone(),
            tracks: selection.tracks,
            criteria,
            applied: selection.applied,
            strategy,
            warnings,
        })
    }
}
