use alloy::primitives::{Address, U256};
use mezo_core::{BoxError, CompletionFeatures, FunctionDefinition, Tool, gen_schema_for};
use mezo_engine::{engine::EngineCtx, unix_ms};
use std::sync::Arc;

use super::{
    FlowError, FlowOutcome, FlowStage, MezoLedger, PromptArgs, extract_with, finish, log_stage,
    parse_amount,
};
use crate::{
    erc20::{allowance, approve_calldata, swap_calldata},
    gateway::{CallRequest, ChainError, UnsignedTx},
    helper::to_base_units,
};

/// Fixed gas limit of the router approval
pub const APPROVE_GAS_LIMIT: u64 = 50_000;
/// Added to the swap gas estimate
pub const SWAP_GAS_BUFFER: u64 = 10_000;
/// Swap gas limit when estimation fails
pub const SWAP_GAS_FALLBACK: u64 = 250_000;
/// Minimum wrapped BTC accepted from the swap
pub static SWAP_MIN_OUT: &str = "0.000000000000001";
/// Seconds until the swap expires
pub const SWAP_DEADLINE_SECS: u64 = 600;

const BTC_SYMBOLS: [&str; 3] = ["btc", "wbtc", "wtbtc"];

impl MezoLedger {
    /// Swaps mUSD for wrapped BTC through the router, approving it first when the
    /// allowance does not cover the amount.
    ///
    /// The router address always comes from [`super::MezoAddresses`]; the one
    /// extracted from the prompt is only logged.
    pub async fn swap_musd_btc(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> FlowOutcome {
        finish("swap_musd_btc", self.try_swap_musd_btc(ctx, prompt).await)
    }

    async fn try_swap_musd_btc(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<FlowOutcome, FlowError> {
        let req = extract_with(&self.swap_extractor, ctx, prompt, "swap").await?;
        log::info!(
            from = req.from_currency,
            to = req.to_currency,
            router = req.router_address;
            "swap request parsed"
        );
        log_stage("swap_musd_btc", FlowStage::Parsed);
        if !req.from_currency.trim().eq_ignore_ascii_case("musd")
            || !BTC_SYMBOLS
                .iter()
                .any(|s| req.to_currency.trim().eq_ignore_ascii_case(s))
        {
            return Err(FlowError::validation(
                "This function only supports swapping mUSD for BTC.",
            ));
        }
        let amount = parse_amount(&req.amount)?;
        let min_out = to_base_units(SWAP_MIN_OUT)
            .map_err(|err| FlowError::validation(err.to_string()))?;
        let sender = self.sender()?;
        log_stage("swap_musd_btc", FlowStage::Validated);

        let _guard = self.nonce_lock.lock().await;
        self.approve_if_needed(sender, amount)
            .await
            .map_err(|err| FlowError::chain("Approval failed", err))?;

        let deadline = U256::from(unix_ms() / 1000 + SWAP_DEADLINE_SECS);
        let tx = self
            .prepare_swap(sender, amount, min_out, deadline)
            .await
            .map_err(|err| FlowError::chain("Swap transaction failed", err))?;
        let tx_hash = self
            .sign_and_broadcast("swap_musd_btc", tx)
            .await
            .map_err(|err| FlowError::chain("Swap transaction failed", err))?;
        Ok(FlowOutcome::Success {
            message: format!("Swap Successful! TX Hash: {}", tx_hash),
            tx_hash: Some(tx_hash),
        })
    }

    async fn approve_if_needed(&self, sender: Address, amount: U256) -> Result<(), ChainError> {
        let router = self.addresses.router;
        let current = allowance(self.gateway.as_ref(), self.addresses.musd, sender, router).await?;
        if current >= amount {
            log::info!(allowance = current.to_string(); "sufficient allowance already set");
            return Ok(());
        }

        log::info!(
            allowance = current.to_string(),
            required = amount.to_string();
            "allowance too low, approving router"
        );
        let nonce = self.gateway.next_nonce(sender, true).await?;
        let gas_price = self.gateway.gas_price().await?;
        let tx_hash = self
            .gateway
            .sign_and_send(UnsignedTx {
                to: self.addresses.musd,
                value: U256::ZERO,
                input: approve_calldata(router, amount),
                gas_limit: APPROVE_GAS_LIMIT,
                gas_price,
                nonce,
                chain_id: self.chain_id(),
            })
            .await?;
        log::info!(tx_hash = tx_hash.to_string(); "approval settled");
        Ok(())
    }

    async fn prepare_swap(
        &self,
        sender: Address,
        amount: U256,
        min_out: U256,
        deadline: U256,
    ) -> Result<UnsignedTx, ChainError> {
        let router = self.addresses.router;
        let input = swap_calldata(
            amount,
            min_out,
            vec![self.addresses.musd, self.addresses.wrapped_btc],
            sender,
            deadline,
        );
        let nonce = self.gateway.next_nonce(sender, true).await?;
        let gas_price = self.gateway.gas_price().await?;
        let gas_limit = self
            .gateway
            .estimate_gas_buffered(
                CallRequest {
                    from: Some(sender),
                    to: router,
                    value: U256::ZERO,
                    input: input.clone(),
                },
                SWAP_GAS_BUFFER,
                SWAP_GAS_FALLBACK,
            )
            .await;
        Ok(UnsignedTx {
            to: router,
            value: U256::ZERO,
            input,
            gas_limit,
            gas_price,
            nonce,
            chain_id: self.chain_id(),
        })
    }
}

/// Swaps mUSD for wrapped BTC on Mezo.
#[derive(Clone)]
pub struct SwapMusdBtcTool {
    ledger: Arc<MezoLedger>,
    schema: serde_json::Value,
}

impl SwapMusdBtcTool {
    pub const NAME: &'static str = "mezo_swap_musd_btc";

    pub fn new(ledger: Arc<MezoLedger>) -> Self {
        Self {
            ledger,
            schema: gen_schema_for::<PromptArgs>(),
        }
    }
}

impl Tool<EngineCtx> for SwapMusdBtcTool {
    type Args = PromptArgs;
    type Output = FlowOutcome;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        "Swaps mUSD for Wrapped BTC using the Dumpy Swap router. \
        The prompt should specify the mUSD amount to swap."
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
        Ok(self.ledger.swap_musd_btc(&ctx, args.prompt).await)
    }
}
