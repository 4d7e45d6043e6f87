pub mod criteria;
pub mod gemini;
pub mod openai;

pub use criteria::*;
pub use gemini::GeminiModel;
pub use openai::OpenAiModel;

use crate::config::LlmProvider;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from a language-model backend
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model '{0}' not found")]
    NotFound(String),

    #[error("model API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("no language model configured")]
    NotConfigured,

    #[error("all {0} candidate models failed")]
    Exhausted(usize),
}

/// Structured output schema offered to the model as a callable function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A single-turn completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub function: Option<FunctionSpec>,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    /// `arguments` is the raw JSON object the model produced for the function
    FunctionCall { name: String, arguments: String },
}

#[cfg_attr(test, mockall::automock)]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> String;

    fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Stand-in used when no provider is configured; every call takes the fallback path
pub struct NoModel;

impl LanguageModel for NoModel {
    fn name(&self) -> String {
        "none".to_string()
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
        Err(LlmError::NotConfigured)
    }
}

pub fn build_model(provider: &LlmProvider) -> Box<dyn LanguageModel> {
    match provider {
        LlmProvider::Gemini { api_key, models } => Box::new(GeminiModel::new(api_key, models.clone())),
        LlmProvider::OpenAi { api_key, model } => Box::new(OpenAiModel::new(api_key, model)),
        LlmProvider::None => Box::new(NoModel),
    }
}

/// Try each model in priority order until one succeeds.
/// A missing model is skipped quietly; any other failure is logged before moving on.
pub fn complete_with_fallback<T>(
    models: &[String],
    mut call: impl FnMut(&str) -> Result<T, LlmError>,
) -> Result<T, LlmError> {
    for model in models {
        match call(model) {
            Ok(value) => return Ok(value),
            Err(LlmError::NotFound(_)) => debug!(%model, "Model not available, trying next"),
            Err(err) => warn!(%model, %err, "Model call failed, trying next"),
        }
    }
    Err(LlmError::Exhausted(models.len()))
}

/// Map a failed `ureq` call onto the model error taxonomy
pub(crate) fn http_error(model: &str, err: ureq::Error) -> LlmError {
    match err {
        ureq::Error::Status(404, _) => LlmError::NotFound(model.to_string()),
        ureq::Error::Status(status, response) => LlmError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => LlmError::Transport(transport.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn skips_missing_and_failing_models() {
        let mut tried = Vec::new();
        let result = complete_with_fallback(&models(&["old", "broken", "good", "unused"]), |model| {
            tried.push(model.to_string());
            match model {
                "old" => Err(LlmError::NotFound(model.to_string())),
                "broken" => Err(LlmError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                }),
                _ => Ok(model.to_string()),
            }
        });

        assert_eq!(result.unwrap(), "good");
        assert_eq!(tried, vec!["old", "broken", "good"]);
    }

    #[test]
    fn exhausting_every_model_is_an_error() {
        let result: Result<(), LlmError> = complete_with_fallback(&models(&["a", "b"]), |model| {
            Err(LlmError::NotFound(model.to_string()))
        });
        assert!(matches!(result, Err(LlmError::Exhausted(2))));
    }

    #[test]
    fn unconfigured_model_always_fails() {
        let request = CompletionRequest {
            system: String::new(),
            user: "hola".to_string(),
            function: None,
            temperature: 0.7,
        };
        assert!(matches!(NoModel.complete(&request), Err(LlmError::NotConfigured)));
    }
}
