use super::{Completion, CompletionRequest, LanguageModel, LlmError, complete_with_fallback, http_error};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use urlencoding::encode;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` client with a prioritized list of model ids
pub struct GeminiModel {
    agent: Agent,
    base_url: String,
    api_key: String,
    models: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

impl GeminiModel {
    pub fn new(api_key: &str, models: Vec<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
            base_url: GEMINI_API_BASE.to_string(),
            api_key: api_key.to_string(),
            models,
        }
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user }] }],
            "generationConfig": { "temperature": request.temperature },
        });

        if let Some(function) = &request.function {
            body["tools"] = json!([{
                "functionDeclarations": [{
                    "name": function.name,
                    "description": function.description,
                    "parameters": function.parameters,
                }]
            }]);
            body["toolConfig"] = json!({
                "functionCallingConfig": {
                    "mode": "ANY",
                    "allowedFunctionNames": [function.name],
                }
            });
        }
        body
    }

    fn call_model(&self, model: &str, body: &serde_json::Value) -> Result<Completion, LlmError> {
        // The key travels in the query string, so the URL is never logged
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            encode(model),
            encode(&self.api_key)
        );
        debug!(%model, "Calling Gemini");

        let response = self
            .agent
            .post(&url)
            .send_json(body.clone())
            .map_err(|err| http_error(model, err))?;
        let parsed: GenerateContentResponse = response
            .into_json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        completion_from(parsed)
    }
}

/// First function call in the first candidate, else its concatenated text
fn completion_from(response: GenerateContentResponse) -> Result<Completion, LlmError> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut text = String::new();
    for part in parts {
        if let Some(call) = part.function_call {
            return Ok(Completion::FunctionCall {
                name: call.name,
                arguments: call.args.to_string(),
            });
        }
        if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
    }

    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse("empty Gemini response".to_string()));
    }
    Ok(Completion::Text(text))
}

impl LanguageModel for GeminiModel {
    fn name(&self) -> String {
        format!("gemini ({})", self.models.join(", "))
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = Self::request_body(request);
        complete_with_fallback(&self.models, |model| self.call_model(model, &body))
    }
}
