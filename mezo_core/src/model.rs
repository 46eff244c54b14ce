use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::{BoxError, Json};

/// Represents the output of an agent execution
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentOutput {
    /// The output content from the agent, may be empty
    pub content: String,

    /// Indicates failure reason if present, None means successful execution
    /// Should be None when finish_reason is "stop" or "tool_calls"
    pub failed_reason: Option<String>,

    /// Tool calls requested by the model, with results filled in by the engine when executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Represents a tool call response with it's ID, function name, and arguments
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: String,

    /// The result of the tool call, processed by agents engine, if available
    pub result: Option<String>,
}

/// Represents a message in the agent's conversation history
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Message {
    /// Message role: "system", "user", "assistant", "tool"
    pub role: String,

    /// The content of the message
    pub content: String,

    /// An optional name for the participant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool call that this message is responding to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Defines a callable function with its metadata and schema
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON schema defining the function's parameters
    pub parameters: Json,

    /// Whether to enable strict schema adherence when generating the function call. If set to true, the model will follow the exact schema defined in the parameters field. Only a subset of JSON Schema is supported when strict is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Struct representing a general completion request that can be sent to a completion model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The system message to be sent to the completion model provider, as the "system" role
    pub system: Option<String>,

    /// The name of system role
    pub system_name: Option<String>,

    /// The chat history to be sent to the completion model provider
    pub chat_history: Vec<Message>,

    /// The prompt to be sent to the completion model provider as "user" role
    pub prompt: String,

    /// The name of the prompter
    pub prompter_name: Option<String>,

    /// The tools to be sent to the completion model provider
    pub tools: Vec<FunctionDefinition>,

    /// Whether the tool choice is required
    pub tool_choice_required: bool,

    /// The temperature to be sent to the completion model provider
    pub temperature: Option<f64>,

    /// The max tokens to be sent to the completion model provider
    pub max_tokens: Option<usize>,

    /// Asks the provider for a JSON object instead of free text.
    pub json_output: bool,
}

impl CompletionRequest {
    /// Adds multiple tools to the request
    pub fn append_tools(mut self, tools: Vec<FunctionDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }
}

/// Provides LLM completion capabilities for agents
pub trait CompletionFeatures: Sized {
    /// Generates a completion based on the given request
    fn completion(
        &self,
        req: CompletionRequest,
    ) -> impl Future<Output = Result<AgentOutput, BoxError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_definition_json() {
        let def = FunctionDefinition {
            name: "mezo_token_price".to_string(),
            description: "Query token price".to_string(),
            parameters: json!({"type": "object"}),
            strict: None,
        };
        let s = serde_json::to_string(&def).unwrap();
        assert_eq!(
            s,
            r#"{"name":"mezo_token_price","description":"Query token price","parameters":{"type":"object"}}"#
        );
    }

    #[test]
    fn test_append_tools() {
        let req = CompletionRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        }
        .append_tools(vec![FunctionDefinition::default(), FunctionDefinition::default()]);
        assert_eq!(req.tools.len(), 2);
        assert!(!req.tool_choice_required);
    }
}
