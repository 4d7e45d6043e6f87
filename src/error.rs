use crate::models::BpmRange;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the streaming API client
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("access token expired or missing")]
    Unauthorized,

    /// Throttled response; only seen inside the retry loop
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("rate limit wait of {0:?} is too long to block on")]
    RateLimitWaitTooLong(Duration),

    #[error("still rate limited after {0} retries")]
    RateLimitExhausted(u32),

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Errors that must abort the current operation instead of being skipped over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized
                | ApiError::RateLimited { .. }
                | ApiError::RateLimitWaitTooLong(_)
                | ApiError::RateLimitExhausted(_)
        )
    }
}

/// The constraints that were in force when selection ran
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppliedConstraints {
    pub candidate_count: usize,
    pub genres: Vec<String>,
    pub artists: Vec<String>,
    pub excluded_genres: Vec<String>,
    pub bpm_range: Option<BpmRange>,
    /// Unknown-tempo tracks were kept because the strict tempo filter emptied the pool
    pub relaxed_tempo: bool,
    pub max_tracks: usize,
}

impl fmt::Display for AppliedConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("{} candidates", self.candidate_count)];
        if !self.genres.is_empty() {
            parts.push(format!("genres: {}", self.genres.join(", ")));
        }
        if !self.artists.is_empty() {
            parts.push(format!("artists: {}", self.artists.join(", ")));
        }
        if !self.excluded_genres.is_empty() {
            parts.push(format!("excluded genres: {}", self.excluded_genres.join(", ")));
        }
        if let Some(range) = &self.bpm_range {
            parts.push(format!("bpm: {range}"));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// How a pipeline failure should be presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The prompt must be rephrased
    UserInput,
    /// Something upstream failed; trying again may work
    Transient,
    /// Nothing in the catalog satisfied the constraints
    EmptyResult,
    Fatal,
}

/// Failures surfaced by the playlist pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid prompt: {0}")]
    InvalidInput(String),

    #[error("streaming service authorization failed: {0}")]
    Auth(String),

    #[error("streaming service rate limit: {0}")]
    RateLimited(String),

    #[error("no tracks matched the constraints ({0})")]
    NoMatchingTracks(AppliedConstraints),

    #[error("streaming service error: {0}")]
    Upstream(ApiError),
}

impl From<ApiError> for PipelineError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => PipelineError::Auth(err.to_string()),
            ApiError::RateLimited { .. }
            | ApiError::RateLimitWaitTooLong(_)
            | ApiError::RateLimitExhausted(_) => PipelineError::RateLimited(err.to_string()),
            other => PipelineError::Upstream(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::UserInput,
            PipelineError::RateLimited(_) | PipelineError::Upstream(_) => ErrorKind::Transient,
            PipelineError::NoMatchingTracks(_) => ErrorKind::EmptyResult,
            PipelineError::Auth(_) => ErrorKind::Fatal,
        }
    }

    /// Message suitable for showing to the person who typed the prompt
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidInput(reason) => {
                format!("Please rephrase your request: {reason}")
            }
            PipelineError::Auth(_) => {
                "Your streaming session expired. Please log in again.".to_string()
            }
            PipelineError::RateLimited(_) | PipelineError::Upstream(_) => {
                "Something went wrong talking to the streaming service. Please try again in a moment.".to_string()
            }
            PipelineError::NoMatchingTracks(applied) => format!(
                "No tracks from the label matched your request ({applied}). Try a broader prompt."
            ),
        }
    }
}
