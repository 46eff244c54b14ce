//! OpenAI API client implementation for the Mezo engine
//!
//! This module provides integration with the chat completions API, including:
//! - Client configuration and management
//! - Completion model handling
//! - Response parsing and conversion to the engine's internal formats
//!
//! Any endpoint speaking the same protocol can be used by passing a custom base URL.

use log::{Level::Debug, log_enabled};
use mezo_core::{
    AgentOutput, BoxError, BoxPinFut, CompletionFeatures, CompletionRequest, FunctionDefinition,
    Message, ToolCall,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{CompletionFeaturesDyn, request_client_builder};

// ================================================================
// Main OpenAI Client
// ================================================================
const API_BASE_URL: &str = "https://api.openai.com/v1";

/// `gpt-4o` completion model
pub const GPT_4O: &str = "gpt-4o";
/// `gpt-4o-mini` completion model
pub const GPT_4O_MINI: &str = "gpt-4o-mini";

/// OpenAI API client for handling completions
#[derive(Clone)]
pub struct Client {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
}

impl Client {
    /// Creates a new OpenAI client with the given API key
    ///
    /// # Arguments
    /// * `api_key` - API key for bearer authentication
    /// * `endpoint` - Optional base URL, defaults to the OpenAI API
    pub fn new(api_key: &str, endpoint: Option<String>) -> Result<Self, BoxError> {
        let endpoint = match endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => API_BASE_URL.to_string(),
        };
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: request_client_builder().build()?,
        })
    }

    /// Sets a custom HTTP client for the client
    pub fn with_client(self, http: reqwest::Client) -> Self {
        Self { http, ..self }
    }

    /// Creates a POST request builder for the given API path
    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        self.http.post(url).bearer_auth(&self.api_key)
    }

    /// Creates a completion model with the given name
    pub fn completion_model(&self, model: &str) -> CompletionModel {
        CompletionModel::new(self.clone(), if model.is_empty() { GPT_4O_MINI } else { model })
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Prompt tokens: {} Total tokens: {}",
            self.prompt_tokens, self.total_tokens
        )
    }
}

/// Completion response from the chat completions API
#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    fn try_into(mut self) -> Result<AgentOutput, BoxError> {
        if self.choices.is_empty() {
            return Err("No completion choice".into());
        }
        let choice = self.choices.remove(0);
        let mut output = AgentOutput {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.map(|tools| {
                tools
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        args: tc.function.arguments,
                        result: None,
                    })
                    .collect()
            }),
            ..Default::default()
        };

        if !matches!(choice.finish_reason.as_str(), "stop" | "tool_calls") {
            output.failed_reason = Some(choice.finish_reason);
        }
        if let Some(refusal) = choice.message.refusal {
            output.failed_reason = Some(refusal);
        }

        Ok(output)
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub index: usize,
    pub message: MessageOutput,
    pub finish_reason: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageOutput {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    pub refusal: Option<String>,
    pub tool_calls: Option<Vec<ToolCallOutput>>,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallOutput {
    pub id: String,
    pub r#type: String,
    pub function: Function,
}

#[derive(Debug, Deserialize)]
pub struct Function {
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

impl From<FunctionDefinition> for ToolDefinition {
    fn from(f: FunctionDefinition) -> Self {
        Self {
            r#type: "function".into(),
            function: f,
        }
    }
}

/// Completion model wrapper for the chat completions API
#[derive(Clone)]
pub struct CompletionModel {
    client: Client,
    /// Model identifier
    pub model: String,
}

impl CompletionModel {
    pub fn new(client: Client, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

/// Builds the request body for a chat completion.
fn request_body(model: &str, mut req: CompletionRequest) -> Value {
    let mut full_history = if let Some(system) = &req.system {
        vec![Message {
            role: "system".into(),
            content: system.to_owned(),
            name: req.system_name.clone(),
            ..Default::default()
        }]
    } else {
        vec![]
    };

    full_history.append(&mut req.chat_history);
    full_history.push(Message {
        role: "user".into(),
        content: req.prompt,
        name: req.prompter_name,
        ..Default::default()
    });

    let mut body = serde_json::Map::new();
    body.insert("model".to_string(), Value::from(model));
    body.insert("messages".to_string(), json!(full_history));
    if let Some(temperature) = req.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(max_tokens) = req.max_tokens {
        body.insert("max_tokens".to_string(), Value::from(max_tokens));
    }
    if req.json_output {
        body.insert(
            "response_format".to_string(),
            json!({"type": "json_object"}),
        );
    }
    if !req.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            json!(
                req.tools
                    .into_iter()
                    .map(ToolDefinition::from)
                    .collect::<Vec<_>>()
            ),
        );
        body.insert(
            "tool_choice".to_string(),
            if req.tool_choice_required {
                Value::from("required")
            } else {
                Value::from("auto")
            },
        );
    }

    Value::Object(body)
}

impl CompletionFeatures for CompletionModel {
    async fn completion(&self, req: CompletionRequest) -> Result<AgentOutput, BoxError> {
        CompletionFeaturesDyn::completion(self, req).await
    }
}

impl CompletionFeaturesDyn for CompletionModel {
    fn completion(&self, req: CompletionRequest) -> BoxPinFut<Result<AgentOutput, BoxError>> {
        let model = self.model.clone();
        let client = self.client.clone();

        Box::pin(async move {
            let body = request_body(&model, req);
            if log_enabled!(Debug) {
                if let Ok(val) = serde_json::to_string(&body) {
                    log::debug!(request = val; "OpenAI completions request");
                }
            }

            let response = client.post("/chat/completions").json(&body).send().await?;
            if response.status().is_success() {
                let text = response.text().await?;
                log::debug!(response = text; "OpenAI completions response");
                match serde_json::from_str::<CompletionResponse>(&text) {
                    Ok(res) => res.try_into(),
                    Err(err) => Err(format!("OpenAI completions error: {}, body: {}", err, text).into()),
                }
            } else {
                let status = response.status();
                let msg = response.text().await?;
                Err(format!("OpenAI completions error: {}, body: {}", status, msg).into())
            }
        })
    }
}
