use mezo_core::{BoxError, CompletionFeatures, FunctionDefinition, Tool, gen_schema_for};
use mezo_engine::engine::EngineCtx;
use std::sync::Arc;

use super::{
    FlowError, FlowOutcome, FlowStage, MezoLedger, PromptArgs, directory_error_kind,
    extract_with, finish, log_stage,
};
use crate::{erc20::token_balance, helper::format_base_units};

impl MezoLedger {
    /// Reads the sender's ERC20 balance of the token named in `prompt`.
    pub async fn balance_of(&self, ctx: &impl CompletionFeatures, prompt: String) -> FlowOutcome {
        finish("balance_of", self.try_balance_of(ctx, prompt).await)
    }

    async fn try_balance_of(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<FlowOutcome, FlowError> {
        let query = extract_with(&self.balance_extractor, ctx, prompt, "balance").await?;
        let symbol = query.token_symbol.trim();
        if symbol.is_empty() {
            return Err(FlowError::extraction(
                "Could not extract token symbol for balance query.",
            ));
        }
        log_stage("balance_of", FlowStage::Parsed);

        let token = self.directory.resolve(symbol).await.map_err(|err| {
            FlowError::new(
                directory_error_kind(&err),
                format!("Failed to fetch balance: {}", err),
            )
        })?;
        let owner = self.sender()?;
        let balance = token_balance(self.gateway.as_ref(), token, owner)
            .await
            .map_err(|err| FlowError::chain("Failed to fetch balance", err))?;
        Ok(FlowOutcome::Success {
            message: format!(
                "{} Balance: {}",
                symbol.to_uppercase(),
                format_base_units(balance)
            ),
            tx_hash: None,
        })
    }
}

/// Queries the signer's balance of a token on Mezo.
#[derive(Clone)]
pub struct TokenBalanceTool {
    ledger: Arc<MezoLedger>,
    schema: serde_json::Value,
}

impl TokenBalanceTool {
    pub const NAME: &'static str = "mezo_token_balance";

    pub fn new(ledger: Arc<MezoLedger>) -> Self {
        Self {
            ledger,
            schema: gen_schema_for::<PromptArgs>(),
        }
    }
}

impl Tool<EngineCtx> for TokenBalanceTool {
    type Args = PromptArgs;
    type Output = FlowOutcome;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        "Checks the wallet balance of a token on Mezo Matsnet, e.g. \"What is my mUSD balance?\""
            .to_string()
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
        Ok(self.ledger.balance_of(&ctx, args.prompt).await)
    }
}
