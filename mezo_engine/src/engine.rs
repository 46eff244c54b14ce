//! The engine ties a [`Model`] to a registry of tools.
//!
//! [`Engine::chat`] runs a single agent turn: the model sees every registered
//! tool, each tool call it requests is executed in order, and the rendered tool
//! outputs become the reply. Tools receive an [`EngineCtx`], the immutable
//! context that gives them access to the model.

use mezo_core::{
    AgentOutput, BoxError, CompletionFeatures, CompletionRequest, FunctionDefinition, Tool,
    ToolSet,
};
use std::sync::Arc;

use crate::model::Model;

/// Context passed to every tool call.
#[derive(Clone)]
pub struct EngineCtx {
    name: String,
    model: Model,
}

impl EngineCtx {
    /// Name of the engine this context belongs to
    pub fn engine_name(&self) -> &str {
        &self.name
    }
}

impl CompletionFeatures for EngineCtx {
    async fn completion(&self, req: CompletionRequest) -> Result<AgentOutput, BoxError> {
        self.model.completion(req).await
    }
}

#[derive(Clone)]
pub struct Engine {
    ctx: EngineCtx,
    tools: Arc<ToolSet<EngineCtx>>,
    system: Option<String>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn name(&self) -> String {
        self.ctx.name.clone()
    }

    /// Returns a context for calling tools or the model directly.
    pub fn ctx(&self) -> EngineCtx {
        self.ctx.clone()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    pub fn tool_definitions(&self, names: Option<&[&str]>) -> Vec<FunctionDefinition> {
        self.tools.definitions(names)
    }

    /// Calls a registered tool with raw JSON arguments.
    ///
    /// Returns the rendered output and its JSON form.
    pub async fn tool_call(&self, name: &str, args: String) -> Result<(String, String), BoxError> {
        if !self.tools.contains(name) {
            return Err(format!("tool {} not found", name).into());
        }

        log::info!(engine = self.ctx.name, tool = name; "tool call");
        self.tools.call(name, self.ctx.clone(), args).await
    }

    /// Runs one agent turn for the prompt.
    ///
    /// When the model requests tools, each call's rendered output is stored in
    /// the call's `result` and the outputs joined by newlines become the content.
    /// Tool failures are rendered into the result instead of aborting the turn.
    pub async fn chat(&self, prompt: String) -> Result<AgentOutput, BoxError> {
        let req = CompletionRequest {
            system: self.system.clone(),
            system_name: Some(self.ctx.name.clone()),
            prompt,
            ..Default::default()
        }
        .append_tools(self.tools.definitions(None));

        let mut res = self.ctx.completion(req).await?;
        if res.failed_reason.is_some() {
            return Ok(res);
        }

        if let Some(tool_calls) = &mut res.tool_calls {
            let mut outputs: Vec<String> = Vec::with_capacity(tool_calls.len());
            for call in tool_calls.iter_mut() {
                let text = match self.tool_call(&call.name, call.args.clone()).await {
                    Ok((text, _)) => text,
                    Err(err) => {
                        log::warn!(tool = call.name; "tool call failed: {}", err);
                        format!("❌ {}", err)
                    }
                };
                call.result = Some(text.clone());
                outputs.push(text);
            }
            if !outputs.is_empty() {
                res.content = outputs.join("\n");
            }
        }

        Ok(res)
    }
}

pub struct EngineBuilder {
    name: String,
    model: Model,
    tools: ToolSet<EngineCtx>,
    system: Option<String>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            name: "mezo".to_string(),
            model: Model::not_implemented(),
            tools: ToolSet::new(),
            system: None,
        }
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system prompt used by [`Engine::chat`].
    pub fn with_system(mut self, system: String) -> Self {
        self.system = Some(system);
        self
    }

    pub fn register_tool<T>(mut self, tool: T) -> Result<Self, BoxError>
    where
        T: Tool<EngineCtx> + Send + Sync + 'static,
    {
        self.tools.add(tool)?;
        Ok(self)
    }

    pub fn build(self) -> Engine {
        Engine {
            ctx: EngineCtx {
                name: self.name,
                model: self.model,
            },
            tools: Arc::new(self.tools),
            system: self.system,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezo_core::Json;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct ShoutArgs {
        prompt: String,
    }

    struct ShoutTool;

    impl Tool<EngineCtx> for ShoutTool {
        type Args = ShoutArgs;
        type Output = String;

        fn name(&self) -> String {
            "shout".to_string()
        }

        fn description(&self) -> String {
            "Shout the prompt".to_string()
        }

        fn definition(&self) -> FunctionDefinition {
            FunctionDefinition {
                name: self.name(),
                description: self.description(),
                parameters: Json::Null,
                strict: None,
            }
        }

        async fn call(&self, _ctx: EngineCtx, args: Self::Args) -> Result<Self::Output, BoxError> {
            Ok(args.prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_chat_runs_tools() {
        let engine = EngineBuilder::new()
            .with_model(Model::mock_implemented())
            .register_tool(ShoutTool)
            .unwrap()
            .build();
        assert_eq!(engine.tool_names(), vec!["shout".to_string()]);

        let res = engine.chat(r#"{"prompt":"gm"}"#.to_string()).await.unwrap();
        assert_eq!(res.content, "GM");
        assert_eq!(res.tool_calls.unwrap()[0].result.as_deref(), Some("GM"));

        // invalid arguments are rendered, not raised
        let res = engine.chat("gm".to_string()).await.unwrap();
        assert!(res.content.starts_with("❌ tool shout, invalid args"));

        assert!(engine.tool_call("missing", "{}".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_chat_without_tools() {
        let engine = EngineBuilder::new()
            .with_model(Model::mock_implemented())
            .build();
        let res = engine.chat("gm".to_string()).await.unwrap();
        assert_eq!(res.content, "gm");
        assert!(res.tool_calls.is_none());
    }
}
