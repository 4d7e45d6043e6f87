use super::{Completion, CompletionRequest, FunctionSpec, LanguageModel, LlmError};
use crate::models::{
    BpmRange, Energy, MAX_CRITERIA_ARTISTS, MAX_CRITERIA_GENRES, Mood, SelectionCriteria,
    TasteProfile, Tempo, Track, TrackQuery,
};
use crate::playlist::config::StrategyKind;
use crate::prompt::ActivityMatch;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Longest playlist name taken from the prompt when the model is unavailable
pub const FALLBACK_NAME_CHARS: usize = 50;
const FALLBACK_GENRES: usize = 3;
const CONTEXT_GENRES: usize = 30;
const CONTEXT_ARTISTS: usize = 50;

const CRITERIA_FUNCTION: &str = "buildPlaylistCriteria";
const SUGGEST_FUNCTION: &str = "suggestTracks";
const PICK_FUNCTION: &str = "selectPlaylistTracks";

/// What is known locally about a request before the model is consulted
#[derive(Debug, Clone)]
pub struct CriteriaContext<'a> {
    pub prompt: &'a str,
    pub activity: Option<&'a ActivityMatch>,
    /// Parser-derived count; always overrides whatever the model says
    pub track_count: usize,
    pub taste: &'a TasteProfile,
    pub label: &'a str,
    pub label_genres: &'a [String],
    pub label_artists: &'a [String],
}

impl CriteriaContext<'_> {
    fn mandatory_bpm(&self) -> Option<BpmRange> {
        self.activity.map(|a| a.bpm)
    }
}

/// How the tracks for one request will be found
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Criteria(SelectionCriteria),
    SpecificTracks {
        criteria: SelectionCriteria,
        queries: Vec<TrackQuery>,
    },
    CatalogPick {
        criteria: SelectionCriteria,
        track_ids: Vec<String>,
    },
}

impl Plan {
    pub fn criteria(&self) -> &SelectionCriteria {
        match self {
            Plan::Criteria(criteria)
            | Plan::SpecificTracks { criteria, .. }
            | Plan::CatalogPick { criteria, .. } => criteria,
        }
    }
}

// Model output schemas. Anything that fails to deserialize takes the fallback path.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPlaylist {
    playlist_name: String,
    #[serde(default)]
    description: Option<String>,
    criteria: ModelCriteria,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelCriteria {
    #[serde(default)]
    genres: Option<Vec<String>>,
    #[serde(default)]
    energy: Option<String>,
    #[serde(default)]
    tempo: Option<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    artists: Option<Vec<String>>,
    #[serde(default)]
    exclude_genres: Option<Vec<String>>,
    #[serde(default)]
    bpm_range: Option<BpmRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelSuggestion {
    #[serde(default)]
    playlist_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    tracks: Vec<TrackQuery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPick {
    #[serde(default)]
    playlist_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    selected_track_ids: Vec<i64>,
}

/// Turns a prompt and its local context into selection criteria through a language model
pub struct CriteriaGenerator<'a> {
    model: &'a dyn LanguageModel,
    temperature: f32,
}

impl<'a> CriteriaGenerator<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self {
            model,
            temperature: 0.7,
        }
    }

    /// Choose how tracks are found. The model-driven strategies degrade to criteria on failure.
    pub fn plan(&self, strategy: StrategyKind, ctx: &CriteriaContext, catalog: &[Track]) -> Plan {
        match strategy {
            StrategyKind::Criteria => Plan::Criteria(self.generate(ctx)),
            StrategyKind::SpecificTracks => match self.suggest_tracks(ctx) {
                Ok((criteria, queries)) => {
                    info!(suggested = queries.len(), "Model suggested tracks");
                    Plan::SpecificTracks { criteria, queries }
                }
                Err(err) => {
                    warn!(%err, "Track suggestion failed, falling back to criteria");
                    Plan::Criteria(self.generate(ctx))
                }
            },
            StrategyKind::CatalogPick => match self.pick_from_catalog(ctx, catalog) {
                Ok((criteria, track_ids)) => {
                    info!(picked = track_ids.len(), "Model picked catalog tracks");
                    Plan::CatalogPick {
                        criteria,
                        track_ids,
                    }
                }
                Err(err) => {
                    warn!(%err, "Catalog pick failed, falling back to criteria");
                    Plan::Criteria(self.generate(ctx))
                }
            },
        }
    }

    /// Model-derived criteria, or locally built ones when the model cannot deliver.
    /// Never fails.
    pub fn generate(&self, ctx: &CriteriaContext) -> SelectionCriteria {
        match self.request_criteria(ctx) {
            Ok(criteria) => {
                debug!(?criteria, "Model criteria");
                criteria
            }
            Err(err) => {
                warn!(model = %self.model.name(), %err, "Criteria generation failed, using fallback");
                fallback_criteria(ctx)
            }
        }
    }

    fn request_criteria(&self, ctx: &CriteriaContext) -> Result<SelectionCriteria, LlmError> {
        let request = CompletionRequest {
            system: system_prompt(ctx.label),
            user: criteria_prompt(ctx),
            function: Some(criteria_function()),
            temperature: self.temperature,
        };
        let payload = payload(self.model.complete(&request)?, CRITERIA_FUNCTION)?;
        let parsed: ModelPlaylist = serde_json::from_str(&payload)
            .map_err(|e| LlmError::InvalidResponse(format!("criteria schema: {e}")))?;
        finalize_criteria(parsed, ctx)
    }

    fn suggest_tracks(
        &self,
        ctx: &CriteriaContext,
    ) -> Result<(SelectionCriteria, Vec<TrackQuery>), LlmError> {
        let request = CompletionRequest {
            system: system_prompt(ctx.label),
            user: suggest_prompt(ctx),
            function: Some(suggest_function(ctx.track_count)),
            temperature: self.temperature,
        };
        let payload = payload(self.model.complete(&request)?, SUGGEST_FUNCTION)?;
        let parsed: ModelSuggestion = serde_json::from_str(&payload)
            .map_err(|e| LlmError::InvalidResponse(format!("suggestion schema: {e}")))?;

        if parsed.tracks.is_empty() {
            return Err(LlmError::InvalidResponse("no tracks suggested".to_string()));
        }
        let criteria = local_criteria(ctx, parsed.playlist_name, parsed.description);
        Ok((criteria, parsed.tracks))
    }

    fn pick_from_catalog(
        &self,
        ctx: &CriteriaContext,
        catalog: &[Track],
    ) -> Result<(SelectionCriteria, Vec<String>), LlmError> {
        if catalog.is_empty() {
            return Err(LlmError::InvalidResponse("empty catalog".to_string()));
        }

        let request = CompletionRequest {
            system: system_prompt(ctx.label),
            user: pick_prompt(ctx, catalog),
            function: Some(pick_function(ctx.track_count)),
            temperature: self.temperature,
        };
        let payload = payload(self.model.complete(&request)?, PICK_FUNCTION)?;
        let parsed: ModelPick = serde_json::from_str(&payload)
            .map_err(|e| LlmError::InvalidResponse(format!("pick schema: {e}")))?;

        if parsed.selected_track_ids.len() != ctx.track_count {
            warn!(
                returned = parsed.selected_track_ids.len(),
                expected = ctx.track_count,
                "Model picked an unexpected number of tracks"
            );
        }

        let mut seen = HashSet::new();
        let track_ids: Vec<String> = parsed
            .selected_track_ids
            .iter()
            .filter_map(|&index| usize::try_from(index).ok())
            .filter_map(|index| catalog.get(index))
            .filter(|track| seen.insert(track.id.clone()))
            .map(|track| track.id.clone())
            .collect();

        if track_ids.is_empty() {
            return Err(LlmError::InvalidResponse("no valid catalog indices".to_string()));
        }
        let criteria = local_criteria(ctx, parsed.playlist_name, parsed.description);
        Ok((criteria, track_ids))
    }
}

/// Cut the single JSON object out of a model reply that may carry markdown fences or prose
pub fn extract_json_object(text: &str) -> Option<String> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

fn payload(completion: Completion, expected: &str) -> Result<String, LlmError> {
    match completion {
        Completion::FunctionCall { name, arguments } if name == expected => Ok(arguments),
        Completion::FunctionCall { name, .. } => Err(LlmError::InvalidResponse(format!(
            "unexpected function call '{name}'"
        ))),
        Completion::Text(text) => extract_json_object(&text)
            .ok_or_else(|| LlmError::InvalidResponse("no JSON object in reply".to_string())),
    }
}

fn clean_list(values: Option<Vec<String>>, limit: usize) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .take(limit)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validate model criteria and enforce the locally derived track count and BPM range
fn finalize_criteria(model: ModelPlaylist, ctx: &CriteriaContext) -> Result<SelectionCriteria, LlmError> {
    let playlist_name = model.playlist_name.trim().to_string();
    if playlist_name.is_empty() {
        return Err(LlmError::InvalidResponse("missing playlistName".to_string()));
    }
    let description = non_empty(model.description)
        .unwrap_or_else(|| format!("Playlist personalizada: {playlist_name}"));
    let criteria = model.criteria;

    Ok(SelectionCriteria {
        playlist_name,
        description,
        genres: clean_list(criteria.genres, MAX_CRITERIA_GENRES),
        energy: criteria.energy.as_deref().and_then(Energy::parse),
        tempo: criteria.tempo.as_deref().and_then(Tempo::parse),
        mood: criteria.mood.as_deref().and_then(Mood::parse),
        artists: clean_list(criteria.artists, MAX_CRITERIA_ARTISTS),
        exclude_genres: clean_list(criteria.exclude_genres, usize::MAX),
        max_tracks: ctx.track_count,
        bpm_range: ctx.mandatory_bpm().or(criteria.bpm_range),
    })
}

fn fallback_name(prompt: &str) -> String {
    prompt.trim().chars().take(FALLBACK_NAME_CHARS).collect()
}

/// Criteria built only from the prompt and the taste profile
pub fn fallback_criteria(ctx: &CriteriaContext) -> SelectionCriteria {
    let preferences = &ctx.taste.preferences;
    SelectionCriteria {
        playlist_name: fallback_name(ctx.prompt),
        description: format!("Playlist: {}", ctx.prompt.trim()),
        genres: ctx.taste.top_genres.iter().take(FALLBACK_GENRES).cloned().collect(),
        energy: Some(preferences.energy),
        tempo: Some(preferences.tempo),
        mood: Some(preferences.mood),
        artists: Vec::new(),
        exclude_genres: Vec::new(),
        max_tracks: ctx.track_count,
        bpm_range: ctx.mandatory_bpm(),
    }
}

/// Criteria for model-chosen tracks: the model's name and description, no genre or artist narrowing
fn local_criteria(
    ctx: &CriteriaContext,
    playlist_name: Option<String>,
    description: Option<String>,
) -> SelectionCriteria {
    SelectionCriteria {
        playlist_name: non_empty(playlist_name).unwrap_or_else(|| fallback_name(ctx.prompt)),
        description: non_empty(description)
            .unwrap_or_else(|| format!("Playlist: {}", ctx.prompt.trim())),
        genres: Vec::new(),
        energy: None,
        tempo: None,
        mood: None,
        artists: Vec::new(),
        exclude_genres: Vec::new(),
        max_tracks: ctx.track_count,
        bpm_range: ctx.mandatory_bpm(),
    }
}

fn system_prompt(label: &str) -> String {
    format!(
        "You are a music expert who builds personalized playlists from the catalog of the record label \"{label}\". \
         Prompts are usually written in Spanish. Never invent songs or artists outside that catalog."
    )
}

fn list_or_unknown(values: &[String], limit: usize) -> String {
    if values.is_empty() {
        "not specified".to_string()
    } else {
        values.iter().take(limit).cloned().collect::<Vec<_>>().join(", ")
    }
}

fn context_section(ctx: &CriteriaContext) -> String {
    let mut lines = vec![format!("USER PROMPT: \"{}\"", ctx.prompt.trim())];
    if let Some(activity) = ctx.activity {
        lines.push(format!(
            "IDENTIFIED ACTIVITY: {} (intensity {}, recommended BPM {})",
            activity.activity, activity.intensity, activity.bpm
        ));
    }
    lines.push(format!(
        "TRACK COUNT: exactly {} tracks (about {} minutes)",
        ctx.track_count,
        (ctx.track_count as f64 * 3.5).round()
    ));
    if !ctx.label_genres.is_empty() {
        lines.push(format!(
            "GENRES AVAILABLE IN THE LABEL: {}",
            list_or_unknown(ctx.label_genres, CONTEXT_GENRES)
        ));
    }
    if !ctx.label_artists.is_empty() {
        lines.push(format!(
            "ARTISTS IN THE LABEL: {}",
            list_or_unknown(ctx.label_artists, CONTEXT_ARTISTS)
        ));
    }

    let taste = ctx.taste;
    let favorite_artists: Vec<String> = taste.favorite_artists.iter().map(|a| a.name.clone()).collect();
    lines.push(format!(
        "LISTENER TASTE:\n- Favorite genres: {}\n- Favorite artists: {}\n- Energy: {:?}, tempo: {:?}, mood: {:?}",
        list_or_unknown(&taste.top_genres, CONTEXT_GENRES),
        list_or_unknown(&favorite_artists, CONTEXT_ARTISTS),
        taste.preferences.energy,
        taste.preferences.tempo,
        taste.preferences.mood,
    ));
    lines.join("\n")
}

fn criteria_prompt(ctx: &CriteriaContext) -> String {
    let bpm_rule = match ctx.mandatory_bpm() {
        Some(range) => format!(
            "bpmRange MUST be [{}, {}]; every song must have a tempo inside that range.",
            range.min, range.max
        ),
        None => "Set bpmRange only if the activity calls for a specific tempo.".to_string(),
    };

    format!(
        r#"{context}

INSTRUCTIONS:
1. Interpret the prompt: activity, intensity and duration.
2. maxTracks MUST be {count}.
3. {bpm_rule}
4. Only use genres and artists that exist in the label.
5. Reply with a single JSON object and nothing else:
{{
  "playlistName": "at most 50 characters",
  "description": "at most 200 characters",
  "criteria": {{
    "genres": ["up to 5 genres"],
    "energy": "high | medium | low",
    "tempo": "fast | medium | slow",
    "mood": "upbeat | mellow",
    "artists": ["up to 3 artists"],
    "excludeGenres": ["genres to avoid"],
    "maxTracks": {count},
    "bpmRange": [min, max]
  }}
}}"#,
        context = context_section(ctx),
        count = ctx.track_count,
    )
}

fn suggest_prompt(ctx: &CriteriaContext) -> String {
    format!(
        "{context}\n\nName {count} real songs released by the label that fit the prompt. \
         Vary the artists, with no more than two songs in a row by the same artist. \
         Use the {function} function to return them.",
        context = context_section(ctx),
        count = ctx.track_count,
        function = SUGGEST_FUNCTION,
    )
}

fn pick_prompt(ctx: &CriteriaContext, catalog: &[Track]) -> String {
    let indexed: Vec<serde_json::Value> = catalog
        .iter()
        .enumerate()
        .map(|(index, track)| {
            json!({ "id": index, "name": track.name, "artist": track.artist, "album": track.album })
        })
        .collect();

    format!(
        "{context}\n\nAVAILABLE CATALOG ({total} songs):\n{catalog}\n\n\
         Select EXACTLY {count} songs from the catalog that best fit the prompt, \
         in a listening order that flows. Use only the numeric \"id\" values above \
         and return them with the {function} function.",
        context = context_section(ctx),
        total = catalog.len(),
        catalog = serde_json::Value::Array(indexed),
        count = ctx.track_count,
        function = PICK_FUNCTION,
    )
}

fn criteria_function() -> FunctionSpec {
    FunctionSpec {
        name: CRITERIA_FUNCTION.to_string(),
        description: "Build the selection criteria for a playlist drawn from the label catalog".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "playlistName": { "type": "string" },
                "description": { "type": "string" },
                "criteria": {
                    "type": "object",
                    "properties": {
                        "genres": { "type": "array", "items": { "type": "string" }, "maxItems": MAX_CRITERIA_GENRES },
                        "energy": { "type": "string", "enum": ["high", "medium", "low"] },
                        "tempo": { "type": "string", "enum": ["fast", "medium", "slow"] },
                        "mood": { "type": "string", "enum": ["upbeat", "mellow"] },
                        "artists": { "type": "array", "items": { "type": "string" }, "maxItems": MAX_CRITERIA_ARTISTS },
                        "excludeGenres": { "type": "array", "items": { "type": "string" } },
                        "maxTracks": { "type": "integer" },
                        "bpmRange": { "type": "array", "items": { "type": "number" }, "minItems": 2, "maxItems": 2 }
                    },
                    "required": ["genres"]
                }
            },
            "required": ["playlistName", "description", "criteria"]
        }),
    }
}

fn suggest_function(count: usize) -> FunctionSpec {
    FunctionSpec {
        name: SUGGEST_FUNCTION.to_string(),
        description: "Return specific songs from the label for the playlist".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "playlistName": { "type": "string" },
                "description": { "type": "string" },
                "tracks": {
                    "type": "array",
                    "minItems": count,
                    "items": {
                        "type": "object",
                        "properties": {
                            "trackName": { "type": "string" },
                            "artistName": { "type": "string" }
                        },
                        "required": ["trackName", "artistName"]
                    }
                }
            },
            "required": ["playlistName", "description", "tracks"]
        }),
    }
}

fn pick_function(count: usize) -> FunctionSpec {
    FunctionSpec {
        name: PICK_FUNCTION.to_string(),
        description: "Select songs from the label catalog for a personalized playlist".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "playlistName": { "type": "string" },
                "description": { "type": "string" },
                "selectedTrackIds": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "minItems": count,
                    "maxItems": count
                }
            },
            "required": ["playlistName", "description", "selectedTrackIds"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::models::{DEFAULT_IMAGE, MusicPreferences};

    const NO_NAMES: &[String] = &[];

    fn taste() -> TasteProfile {
        TasteProfile {
            top_genres: vec![
                "trap".to_string(),
                "reggaeton".to_string(),
                "pop".to_string(),
                "cumbia".to_string(),
            ],
            favorite_artists: vec![],
            preferences: MusicPreferences::default(),
        }
    }

    fn running() -> ActivityMatch {
        ActivityMatch {
            activity: "correr".to_string(),
            intensity: "Moderada".to_string(),
            bpm: BpmRange::new(140.0, 160.0),
        }
    }

    fn context<'a>(
        prompt: &'a str,
        activity: Option<&'a ActivityMatch>,
        taste: &'a TasteProfile,
    ) -> CriteriaContext<'a> {
        CriteriaContext {
            prompt,
            activity,
            track_count: 10,
            taste,
            label: "Dale Play Records",
            label_genres: NO_NAMES,
            label_artists: NO_NAMES,
        }
    }

    fn model_replying(reply: Result<Completion, fn() -> LlmError>) -> MockLanguageModel {
        let mut model = MockLanguageModel::new();
        model.expect_name().returning(|| "mock".to_string());
        model.expect_complete().returning(move |_| match &reply {
            Ok(completion) => Ok(completion.clone()),
            Err(make_error) => Err(make_error()),
        });
        model
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artist: "Artist".to_string(),
            artist_id: None,
            album: "Album".to_string(),
            album_id: None,
            image: DEFAULT_IMAGE.to_string(),
            duration_ms: 180_000,
            preview_url: None,
            uri: format!("spotify:track:{id}"),
            label: Some("Dale Play Records".to_string()),
            tempo: None,
        }
    }

    #[test]
    fn extracts_json_from_fences_and_prose() {
        assert_eq!(
            extract_json_object("```json\n{\"a\": {\"b\": 1}}\n```").as_deref(),
            Some("{\"a\": {\"b\": 1}}")
        );
        assert_eq!(
            extract_json_object("Here you go: {\"a\": 1} hope it helps").as_deref(),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn overrides_track_count_and_activity_bpm() {
        let reply = r#"```json
        {
          "playlistName": "Run Fast",
          "description": "",
          "criteria": {
            "genres": ["trap", "reggaeton", "pop", "cumbia", "rock", "salsa", "jazz"],
            "energy": "HIGH",
            "mood": "sad",
            "artists": ["A", "B", "C", "D"],
            "maxTracks": 30,
            "bpmRange": [100, 120]
          }
        }
        ```"#;
        let model = model_replying(Ok(Completion::Text(reply.to_string())));
        let taste = taste();
        let activity = running();

        let criteria = CriteriaGenerator::new(&model).generate(&context(
            "playlist para correr 30 minutos",
            Some(&activity),
            &taste,
        ));

        assert_eq!(criteria.playlist_name, "Run Fast");
        assert_eq!(criteria.description, "Playlist personalizada: Run Fast");
        assert_eq!(criteria.max_tracks, 10);
        assert_eq!(criteria.bpm_range, Some(BpmRange::new(140.0, 160.0)));
        assert_eq!(criteria.genres.len(), MAX_CRITERIA_GENRES);
        assert_eq!(criteria.artists, vec!["A", "B", "C"]);
        assert_eq!(criteria.energy, Some(Energy::High));
        assert_eq!(criteria.mood, None);
    }

    #[test]
    fn keeps_model_bpm_without_activity() {
        let reply = r#"{"playlistName": "Chill", "criteria": {"genres": [], "bpmRange": [70, 90]}}"#;
        let model = model_replying(Ok(Completion::Text(reply.to_string())));
        let taste = taste();

        let criteria = CriteriaGenerator::new(&model).generate(&context("algo tranquilo", None, &taste));
        assert_eq!(criteria.bpm_range, Some(BpmRange::new(70.0, 90.0)));
    }

    #[test]
    fn accepts_function_call_payload() {
        let model = model_replying(Ok(Completion::FunctionCall {
            name: CRITERIA_FUNCTION.to_string(),
            arguments: r#"{"playlistName": "Focus", "description": "d", "criteria": {"genres": ["lo-fi"]}}"#
                .to_string(),
        }));
        let taste = taste();

        let criteria = CriteriaGenerator::new(&model).generate(&context("estudiar", None, &taste));
        assert_eq!(criteria.playlist_name, "Focus");
        assert_eq!(criteria.genres, vec!["lo-fi"]);
    }

    #[test]
    fn model_failure_uses_local_fallback() {
        let model = model_replying(Err(|| LlmError::Exhausted(3)));
        let taste = taste();
        let activity = running();
        let prompt = "una playlist muy larga para correr por el parque durante toda la tarde";

        let criteria = CriteriaGenerator::new(&model).generate(&context(prompt, Some(&activity), &taste));

        assert_eq!(criteria.playlist_name.chars().count(), FALLBACK_NAME_CHARS);
        assert!(prompt.starts_with(&criteria.playlist_name));
        assert_eq!(criteria.description, format!("Playlist: {prompt}"));
        assert_eq!(criteria.genres, vec!["trap", "reggaeton", "pop"]);
        assert_eq!(criteria.energy, Some(Energy::Medium));
        assert_eq!(criteria.max_tracks, 10);
        assert_eq!(criteria.bpm_range, Some(BpmRange::new(140.0, 160.0)));
    }

    #[test]
    fn missing_required_fields_fall_back() {
        for reply in [
            r#"{"playlistName": "", "criteria": {}}"#,
            r#"{"playlistName": "No criteria"}"#,
            r#"{"playlistName": "Bad", "criteria": {"bpmRange": "fast"}}"#,
            "I cannot help with that",
        ] {
            let model = model_replying(Ok(Completion::Text(reply.to_string())));
            let taste = taste();
            let criteria = CriteriaGenerator::new(&model).generate(&context("cocinar", None, &taste));
            assert_eq!(criteria.playlist_name, "cocinar", "reply: {reply}");
        }
    }

    #[test]
    fn specific_tracks_plan_keeps_queries_and_activity_bpm() {
        let model = model_replying(Ok(Completion::FunctionCall {
            name: SUGGEST_FUNCTION.to_string(),
            arguments: r#"{"playlistName": "Run", "tracks": [
                {"trackName": "Song A", "artistName": "Artist A"},
                {"trackName": "", "artistName": "Nobody"}
            ]}"#
            .to_string(),
        }));
        let taste = taste();
        let activity = running();

        let plan = CriteriaGenerator::new(&model).plan(
            StrategyKind::SpecificTracks,
            &context("correr", Some(&activity), &taste),
            &[],
        );

        match plan {
            Plan::SpecificTracks { criteria, queries } => {
                assert_eq!(criteria.playlist_name, "Run");
                assert!(criteria.genres.is_empty());
                assert_eq!(criteria.bpm_range, Some(activity.bpm));
                assert_eq!(queries.len(), 2);
                assert_eq!(queries[0], TrackQuery::new("Song A", "Artist A"));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn failing_strategy_degrades_to_criteria() {
        let model = model_replying(Err(|| LlmError::Transport("offline".to_string())));
        let taste = taste();

        let plan = CriteriaGenerator::new(&model).plan(
            StrategyKind::SpecificTracks,
            &context("fiesta", None, &taste),
            &[],
        );
        assert!(matches!(plan, Plan::Criteria(_)));
        assert_eq!(plan.criteria().playlist_name, "fiesta");
    }

    #[test]
    fn catalog_pick_drops_out_of_range_and_repeated_indices() {
        let model = model_replying(Ok(Completion::FunctionCall {
            name: PICK_FUNCTION.to_string(),
            arguments: r#"{"playlistName": "Picked", "selectedTrackIds": [2, 0, 9, -1, 2]}"#.to_string(),
        }));
        let taste = taste();
        let catalog = vec![track("t0"), track("t1"), track("t2")];

        let plan = CriteriaGenerator::new(&model).plan(
            StrategyKind::CatalogPick,
            &context("bailar", None, &taste),
            &catalog,
        );

        match plan {
            Plan::CatalogPick { track_ids, criteria } => {
                assert_eq!(track_ids, vec!["t2", "t0"]);
                assert_eq!(criteria.playlist_name, "Picked");
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn prompt_carries_mandatory_constraints() {
        let taste = taste();
        let activity = running();
        let genres = vec!["trap".to_string()];
        let ctx = CriteriaContext {
            label_genres: &genres,
            ..context("correr", Some(&activity), &taste)
        };

        let prompt = criteria_prompt(&ctx);
        assert!(prompt.contains("maxTracks MUST be 10"));
        assert!(prompt.contains("bpmRange MUST be [140, 160]"));
        assert!(prompt.contains("GENRES AVAILABLE IN THE LABEL: trap"));
    }
}
