use chrono::prelude::*;
use mezo_core::{
    BoxError, CompletionFeatures, CompletionRequest, FunctionDefinition, Tool, gen_schema_for,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::EngineCtx;

/// Name of the character used when none, or an unknown one, is requested.
pub const DEFAULT_CHARACTER: &str = "DigAIJoe";

static DIGAIJOE_PERSONALITY: &str = "\
You are DigaiJoe, a curt, uninterested and snarky character.
- Your replies are super short and snarky.
- Only trigger transaction tools when explicitly asked.
- You never give financial advice with a straight face.";

static BUILTIN_CHARACTERS: &[(&str, &str)] = &[(DEFAULT_CHARACTER, DIGAIJOE_PERSONALITY)];

/// Character definition: the display name and the personality prompt that
/// shapes every reply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Character {
    /// Character's display name, e.g. "DigAIJoe"
    pub name: String,

    /// Personality prompt sent as the system message
    pub personality: String,
}

impl Character {
    pub fn from_toml(content: &str) -> Result<Self, BoxError> {
        let character: Self = toml::from_str(content)?;
        Ok(character)
    }

    pub fn to_toml(&self) -> Result<String, BoxError> {
        let content = toml::to_string(&self)?;
        Ok(content)
    }

    /// Looks up a built-in character by name, falling back to [`DEFAULT_CHARACTER`].
    pub fn builtin(name: &str) -> Character {
        let (name, personality) = BUILTIN_CHARACTERS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .unwrap_or(&BUILTIN_CHARACTERS[0]);
        Character {
            name: name.to_string(),
            personality: personality.to_string(),
        }
    }

    pub fn to_request(&self, prompt: String, prompter_name: Option<String>) -> CompletionRequest {
        let utc: DateTime<Utc> = Utc::now();
        let system = format!(
            "{}\n\nYour name: {}\nThe current time is {}.",
            self.personality.trim(),
            self.name,
            utc.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        CompletionRequest {
            system: Some(system),
            system_name: Some(self.name.clone()),
            prompt: format!("{prompt}\n\nAnswer accordingly."),
            prompter_name,
            ..Default::default()
        }
    }
}

/// Arguments for the character chat tool
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ChatArgs {
    /// the message to answer
    pub prompt: String,
}

/// Replies to a message in the voice of a character.
#[derive(Debug, Clone)]
pub struct CharacterChatTool {
    character: Character,
    schema: serde_json::Value,
}

impl CharacterChatTool {
    pub const NAME: &'static str = "mezo_character_chat";

    pub fn new(character: Character) -> Self {
        Self {
            character,
            schema: gen_schema_for::<ChatArgs>(),
        }
    }

    pub fn character(&self) -> &Character {
        &self.character
    }
}

impl Tool<EngineCtx> for CharacterChatTool {
    type Args = ChatArgs;
    type Output = String;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        format!(
            "Chat with {} for anything that is not a blockchain operation.",
            self.character.name
        )
    }

    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name(),
            description: self.description(),
            parameters: self.schema.clone(),
            strict: None,
        }
    }

    async fn call(&self, ctx: EngineCtx, args: Self::Args) -> Result<Self::Output, BoxError> {
        let req = self.character.to_request(args.prompt, None);
        let res = ctx.completion(req).await?;
        if let Some(reason) = res.failed_reason {
            return Err(format!("{} failed to reply: {}", self.character.name, reason).into());
        }
        Ok(res.content)
    }
}
