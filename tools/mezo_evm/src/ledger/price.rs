use mezo_core::{BoxError, CompletionFeatures, FunctionDefinition, Tool, gen_schema_for};
use mezo_engine::engine::EngineCtx;
use std::sync::Arc;

use super::{
    FlowError, FlowOutcome, FlowStage, MezoLedger, PromptArgs, directory_error_kind,
    extract_with, finish, log_stage,
};
use crate::directory::DirectoryError;

impl MezoLedger {
    /// Reads the index price of the token named in `prompt`.
    pub async fn price_of(&self, ctx: &impl CompletionFeatures, prompt: String) -> FlowOutcome {
        finish("price_of", self.try_price_of(ctx, prompt).await)
    }

    async fn try_price_of(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<FlowOutcome, FlowError> {
        let query = extract_with(&self.price_extractor, ctx, prompt, "price").await?;
        let symbol = query.token_symbol.trim();
        if symbol.is_empty() {
            return Err(FlowError::extraction(
                "Could not extract token symbol for price query.",
            ));
        }
        log_stage("price_of", FlowStage::Parsed);

        let price = self.directory.price(symbol).await.map_err(|err| {
            let kind = directory_error_kind(&err);
            match err {
                DirectoryError::NotFound { .. } | DirectoryError::PriceNotFound(_) => {
                    FlowError::new(kind, err.to_string())
                }
                err => FlowError::new(kind, format!("Failed to fetch token price: {}", err)),
            }
        })?;
        Ok(FlowOutcome::Success {
            message: price.to_string(),
            tx_hash: None,
        })
    }
}

/// Queries the USD and ETH price of a token from the exchange index.
#[derive(Clone)]
pub struct TokenPriceTool {
    ledger: Arc<MezoLedger>,
    schema: serde_json::Value,
}

impl TokenPriceTool {
    pub const NAME: &'static str = "mezo_token_price";

    pub fn new(ledger: Arc<MezoLedger>) -> Self {
        Self {
            ledger,
            schema: gen_schema_for::<PromptArgs>(),
        }
    }
}

impl Tool<EngineCtx> for TokenPriceTool {
    type Args = PromptArgs;
    type Output = FlowOutcome;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        "Gets the current price of a token on Mezo in USD and ETH, e.g. \"What is the price of BTC?\""
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
        Ok(self.ledger.price_of(&ctx, args.prompt).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        directory::{TokenDirectory, tests::*},
        ledger::{ErrorKind, MezoAddresses, mock::*},
    };
    use serde_json::json;

    fn price_ledger(graph: FakeGraph) -> MezoLedger {
        MezoLedger::new(
            Arc::new(FakeGateway::default()),
            TokenDirectory::new(Arc::new(graph)),
            Arc::new(FakeConfirmer::new(Ok(true))),
            MezoAddresses::default(),
        )
    }

    #[tokio::test]
    async fn test_price_of() {
        let ledger = price_ledger(FakeGraph {
            price: Some(json!({
                "id": MUSD_ID,
                "decimals": "18",
                "derivedUSD": "1.001",
                "derivedETH": "0.0003",
            })),
            ..Default::default()
        });
        let res = ledger
            .price_of(&model(json!({"token_symbol": "mUSD"})), "mUSD price?".to_string())
            .await;
        assert_eq!(res.to_string(), "✅ Price of MUSD: 1.001 USD, 0.0003 ETH.");

        let ledger = price_ledger(FakeGraph::default());
        let res = ledger
            .price_of(&model(json!({"token_symbol": "btc"})), "BTC price?".to_string())
            .await;
        assert_eq!(res.to_string(), "❌ Price data for token WTBTC not found.");

        let ledger = price_ledger(FakeGraph {
            down: true,
            ..Default::default()
        });
        let res = ledger
            .price_of(&model(json!({"token_symbol": "btc"})), "BTC price?".to_string())
            .await;
        assert_eq!(
            res,
            FlowOutcome::Failure {
                kind: ErrorKind::Transport,
                message: "Failed to fetch token price: GraphQL query failed with status code 503"
                    .to_string()
            }
        );

        let res = ledger
            .price_of(&model(json!({"token_symbol": ""})), "price".to_string())
            .await;
        assert_eq!(
            res.to_string(),
            "❌ Could not extract token symbol for price query."
        );
    }
}
