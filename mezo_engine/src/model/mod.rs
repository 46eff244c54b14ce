//! Model integration module for the Mezo engine
//!
//! The engine talks to completion providers through [`CompletionFeaturesDyn`] so
//! that the tools never depend on a concrete provider. [`openai`] implements the
//! chat completions protocol, which also serves OpenAI compatible endpoints.
//!
//! [`NotImplemented`] and [`MockImplemented`] are placeholders for wiring and tests.

use mezo_core::{AgentOutput, BoxError, BoxPinFut, CompletionFeatures, CompletionRequest, ToolCall};
use std::{sync::Arc, time::Duration};

use crate::APP_USER_AGENT;

pub mod openai;

/// Trait for dynamic completion features that can be used across threads
pub trait CompletionFeaturesDyn: Send + Sync + 'static {
    /// Performs a completion request and returns a future with the agent's output
    fn completion(&self, req: CompletionRequest) -> BoxPinFut<Result<AgentOutput, BoxError>>;
}

/// A placeholder implementation for unimplemented features
#[derive(Clone, Debug)]
pub struct NotImplemented;

impl CompletionFeaturesDyn for NotImplemented {
    fn completion(&self, _req: CompletionRequest) -> BoxPinFut<Result<AgentOutput, BoxError>> {
        Box::pin(futures::future::ready(Err("not implemented".into())))
    }
}

/// A mock implementation for testing purposes
///
/// Echoes the prompt as content and, when tools are offered, requests every
/// tool with the prompt as its arguments.
#[derive(Clone, Debug)]
pub struct MockImplemented;

impl CompletionFeaturesDyn for MockImplemented {
    fn completion(&self, req: CompletionRequest) -> BoxPinFut<Result<AgentOutput, BoxError>> {
        Box::pin(futures::future::ready(Ok(AgentOutput {
            content: req.prompt.clone(),
            tool_calls: if req.tools.is_empty() {
                None
            } else {
                Some(
                    req.tools
                        .iter()
                        .map(|tool| ToolCall {
                            id: tool.name.clone(),
                            name: tool.name.clone(),
                            args: req.prompt.clone(),
                            result: None,
                        })
                        .collect(),
                )
            },
            ..Default::default()
        })))
    }
}

/// Main model struct holding the completion capability
#[derive(Clone)]
pub struct Model {
    /// Completion feature implementation
    pub completer: Arc<dyn CompletionFeaturesDyn>,
}

impl Model {
    /// Creates a Model with the given completer
    pub fn with_completer(completer: Arc<dyn CompletionFeaturesDyn>) -> Self {
        Self { completer }
    }

    /// Creates a Model with unimplemented features (returns errors for all operations)
    pub fn not_implemented() -> Self {
        Self {
            completer: Arc::new(NotImplemented),
        }
    }

    /// Creates a Model with mock implementations for testing
    pub fn mock_implemented() -> Self {
        Self {
            completer: Arc::new(MockImplemented),
        }
    }
}

impl CompletionFeatures for Model {
    async fn completion(&self, req: CompletionRequest) -> Result<AgentOutput, BoxError> {
        self.completer.completion(req).await
    }
}

/// Shared reqwest client builder for model providers.
pub fn request_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .https_only(true)
        .http2_keep_alive_interval(Some(Duration::from_secs(25)))
        .http2_keep_alive_timeout(Duration::from_secs(15))
        .http2_keep_alive_while_idle(true)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .user_agent(APP_USER_AGENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezo_core::FunctionDefinition;

    #[tokio::test]
    async fn test_mock_model() {
        let model = Model::mock_implemented();
        let res = model
            .completion(CompletionRequest {
                prompt: "gm".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res.content, "gm");
        assert!(res.tool_calls.is_none());

        let res = model
            .completion(CompletionRequest {
                prompt: r#"{"token_symbol":"musd"}"#.to_string(),
                tools: vec![FunctionDefinition {
                    name: "submit_tokenquery".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .await
            .unwrap();
        let calls = res.tool_calls.unwrap();
        assert_eq!(calls[0].name, "submit_tokenquery");
        assert_eq!(calls[0].args, r#"{"token_symbol":"musd"}"#);

        let res = Model::not_implemented()
            .completion(CompletionRequest::default())
            .await;
        assert!(res.is_err());
    }
}
