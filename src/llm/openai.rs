use super::{Completion, CompletionRequest, LanguageModel, LlmError, http_error};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client
pub struct OpenAiModel {
    agent: Agent,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Message,
}

#[derive(Debug, Default, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
    /// Legacy single function call
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
            base_url: OPENAI_API_BASE.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
        });

        if let Some(function) = &request.function {
            body["tools"] = json!([{
                "type": "function",
                "function": {
                    "name": function.name,
                    "description": function.description,
                    "parameters": function.parameters,
                }
            }]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": function.name },
            });
        }
        body
    }
}

fn completion_from(response: ChatResponse) -> Result<Completion, LlmError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| LlmError::InvalidResponse("no choices in OpenAI response".to_string()))?;

    let call = message
        .tool_calls
        .into_iter()
        .flatten()
        .next()
        .map(|tool| tool.function)
        .or(message.function_call);
    if let Some(call) = call {
        return Ok(Completion::FunctionCall {
            name: call.name,
            arguments: call.arguments,
        });
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(Completion::Text(text)),
        _ => Err(LlmError::InvalidResponse("empty OpenAI response".to_string())),
    }
}

impl LanguageModel for OpenAiModel {
    fn name(&self) -> String {
        format!("openai ({})", self.model)
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "Calling OpenAI");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(self.request_body(request))
            .map_err(|err| http_error(&self.model, err))?;
        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        completion_from(parsed)
    }
}
