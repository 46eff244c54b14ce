//! A module for extracting structured data from unstructured text using Language Models (LLMs).
//!
//! # Key Components
//!
//! ## [`SubmitTool`]
//! - Wraps a type `T` that defines the JSON schema for structured data
//! - Provides functionality to submit and validate data
//! - Implements the [`Tool`] trait so it can also be registered in an engine
//!
//! ## [`Extractor`]
//! - Main interface for extracting structured data from text
//! - Issues one completion request per call, no retry
//! - Reads the first tool call, or a JSON object in the reply text when the
//!   model answers without calling the tool
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(JsonSchema, Serialize, Deserialize)]
//! struct TokenQuery {
//!     token_symbol: String,
//! }
//!
//! let extractor = Extractor::<TokenQuery>::default();
//! let (data, _) = extractor.extract(&ctx, "What is my mUSD balance?".into()).await?;
//! ```

use mezo_core::{
    AgentOutput, BoxError, CompletionFeatures, CompletionRequest, FunctionDefinition, Json, Tool,
    extract_json_object, root_schema_for,
};
use schemars::JsonSchema;
use std::marker::PhantomData;

pub use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::engine::EngineCtx;

/// A tool for submitting structured data extracted from text
#[derive(Debug, Clone)]
pub struct SubmitTool<T: JsonSchema + DeserializeOwned + Send + Sync> {
    name: String,
    schema: Json,

    _t: PhantomData<T>,
}

impl<T> Default for SubmitTool<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubmitTool<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync,
{
    /// Creates a new SubmitTool instance
    ///
    /// Automatically generates a JSON schema from the type `T` and
    /// uses the type's title (if available) as the tool name
    pub fn new() -> SubmitTool<T> {
        let schema = root_schema_for::<T>();
        let name = schema
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("tool")
            .to_ascii_lowercase();
        let mut schema = schema.to_value();
        if let Some(obj) = schema.as_object_mut() {
            // strict function calling rejects open objects
            obj.insert("additionalProperties".to_string(), Json::Bool(false));
        }
        SubmitTool {
            name,
            schema,
            _t: PhantomData,
        }
    }

    /// Validates and deserializes the submitted arguments
    pub fn submit(&self, args: &str) -> Result<T, BoxError> {
        serde_json::from_str(args).map_err(|err| format!("invalid args: {}", err).into())
    }
}

impl<T> Tool<EngineCtx> for SubmitTool<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync,
{
    type Args = T;
    type Output = Json;

    fn name(&self) -> String {
        format!("submit_{}", self.name)
    }

    fn description(&self) -> String {
        "Submit the structured data you extracted from the provided text.".to_string()
    }

    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name(),
            description: self.description(),
            parameters: self.schema.clone(),
            strict: Some(true),
        }
    }

    async fn call(&self, _ctx: EngineCtx, data: Self::Args) -> Result<Self::Output, BoxError> {
        Ok(serde_json::to_value(data)?)
    }
}

/// Extractor for structured data from text using LLMs
#[derive(Debug, Clone)]
pub struct Extractor<T: JsonSchema + DeserializeOwned + Serialize + Send + Sync> {
    tool: SubmitTool<T>,
    system: String,
    max_tokens: Option<usize>,
}

impl<T: JsonSchema + DeserializeOwned + Serialize + Send + Sync> Default for Extractor<T> {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl<T: JsonSchema + DeserializeOwned + Serialize + Send + Sync> Extractor<T> {
    /// Creates a new Extractor instance
    ///
    /// # Arguments
    /// * `max_tokens` - Optional maximum number of tokens for the completion
    /// * `instruction` - Optional extra instruction appended to the default system prompt
    pub fn new(max_tokens: Option<usize>, instruction: Option<String>) -> Self {
        let tool = SubmitTool::new();
        let tool_name = Tool::<EngineCtx>::name(&tool);
        let mut system = format!("\
            You are an AI assistant whose purpose is to \
            extract structured data from the provided text.\n\
            You will have access to a `{tool_name}` function that defines the structure of the data to extract from the provided text.\n\
            Use the `{tool_name}` function to submit the structured data.\n\
            Be sure to fill out every field and ALWAYS CALL THE `{tool_name}` function.");
        if let Some(instruction) = instruction {
            system.push_str("\n\n");
            system.push_str(&instruction);
        }
        Self {
            tool,
            max_tokens,
            system,
        }
    }

    /// Returns the definition of the submit function offered to the model
    pub fn definition(&self) -> FunctionDefinition {
        Tool::<EngineCtx>::definition(&self.tool)
    }

    /// Extracts structured data from the provided text
    ///
    /// # Returns
    /// Tuple containing the extracted data and the full agent output
    pub async fn extract(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<(T, AgentOutput), BoxError> {
        let req = CompletionRequest {
            system: Some(self.system.clone()),
            prompt,
            tools: vec![self.definition()],
            tool_choice_required: true,
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        let mut res = ctx.completion(req).await?;
        if let Some(reason) = &res.failed_reason {
            return Err(format!("extract with {} failed: {}", self.tool.name, reason).into());
        }

        if let Some(tool) = res.tool_calls.as_mut().and_then(|calls| calls.first_mut()) {
            let result = self.tool.submit(&tool.args)?;
            tool.result = Some(serde_json::to_string(&result)?);
            return Ok((result, res));
        }

        if let Some(raw) = extract_json_object(&res.content) {
            log::debug!(schema = self.tool.name, content = res.content; "extracted from reply text");
            let result = self.tool.submit(raw)?;
            return Ok((result, res));
        }

        Err(format!(
            "extract with {} failed, no tool_calls and no JSON in reply",
            self.tool.name
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::EngineBuilder,
        model::{CompletionFeaturesDyn, Model},
    };
    use mezo_core::{BoxPinFut, ToolCall};
    use std::sync::Arc;

    #[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
    struct TestStruct {
        name: String,
        age: Option<u8>,
    }

    struct TextReply(&'static str);

    impl CompletionFeaturesDyn for TextReply {
        fn completion(&self, _req: CompletionRequest) -> BoxPinFut<Result<AgentOutput, BoxError>> {
            let content = self.0.to_string();
            Box::pin(futures::future::ready(Ok(AgentOutput {
                content,
                ..Default::default()
            })))
        }
    }

    #[test]
    fn test_definition() {
        let tool = SubmitTool::<TestStruct>::new();
        let definition = Tool::<EngineCtx>::definition(&tool);
        assert_eq!(definition.name, "submit_teststruct");
        let s = serde_json::to_string(&definition).unwrap();
        assert!(s.contains(r#""required":["name"]"#));
        assert!(s.contains(r#""additionalProperties":false"#));
        assert!(!s.contains("$schema"));
    }

    #[tokio::test]
    async fn test_extract_from_tool_call() {
        let extractor = Extractor::<TestStruct>::default();
        let model = Model::mock_implemented();

        let (data, res) = extractor
            .extract(&model, r#"{"name":"Joe","age": 1}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            data,
            TestStruct {
                name: "Joe".to_string(),
                age: Some(1)
            }
        );
        let calls: Vec<ToolCall> = res.tool_calls.unwrap();
        assert_eq!(calls[0].result.as_deref(), Some(r#"{"name":"Joe","age":1}"#));

        let res = extractor
            .extract(&model, r#"{"name": 123}"#.to_string())
            .await;
        assert!(res.unwrap_err().to_string().contains("invalid args"));
    }

    #[tokio::test]
    async fn test_extract_from_text() {
        let extractor = Extractor::<TestStruct>::default();

        let model = Model::with_completer(Arc::new(TextReply(
            "Sure:\n```json\n{\"name\": \"Joe\", \"age\": null}\n```",
        )));
        let (data, _) = extractor.extract(&model, "Joe".to_string()).await.unwrap();
        assert_eq!(data.name, "Joe");
        assert_eq!(data.age, None);

        let model = Model::with_completer(Arc::new(TextReply("I don't know")));
        assert!(extractor.extract(&model, "Joe".to_string()).await.is_err());

        let model = Model::with_completer(Arc::new(TextReply("{\"age\": 3}")));
        assert!(extractor.extract(&model, "Joe".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_submit_tool_in_engine() {
        let tool = SubmitTool::<TestStruct>::default();
        let tool_name = Tool::<EngineCtx>::name(&tool);
        let engine = EngineBuilder::new()
            .with_model(Model::mock_implemented())
            .register_tool(tool)
            .unwrap()
            .build();

        let (res, _) = engine
            .tool_call(&tool_name, r#"{"name": "Joe"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(res, r#"{"age":null,"name":"Joe"}"#);
    }
}
