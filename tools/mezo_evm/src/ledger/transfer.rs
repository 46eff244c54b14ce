use alloy::primitives::{Address, Bytes, U256};
use mezo_core::{BoxError, CompletionFeatures, FunctionDefinition, Tool, gen_schema_for};
use mezo_engine::engine::EngineCtx;
use std::sync::Arc;

use super::{
    FlowError, FlowOutcome, FlowStage, MezoLedger, PromptArgs, extract_with, finish, log_stage,
    parse_amount, parse_recipient,
};
use crate::{
    erc20::transfer_calldata,
    gateway::{CallRequest, ChainError, UnsignedTx},
    helper::format_base_units,
};

impl MezoLedger {
    /// Sends native BTC as described by `prompt`.
    pub async fn transfer_btc(&self, ctx: &impl CompletionFeatures, prompt: String) -> FlowOutcome {
        finish("transfer_btc", self.try_transfer_btc(ctx, prompt).await)
    }

    /// Sends mUSD as described by `prompt`.
    pub async fn transfer_musd(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> FlowOutcome {
        finish("transfer_musd", self.try_transfer_musd(ctx, prompt).await)
    }

    async fn try_transfer_btc(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<FlowOutcome, FlowError> {
        let req = extract_with(&self.transfer_extractor, ctx, prompt, "transaction").await?;
        log_stage("transfer_btc", FlowStage::Parsed);
        if !req.currency.trim().eq_ignore_ascii_case("btc") {
            return Err(FlowError::validation(
                "This function only supports BTC transactions.",
            ));
        }
        let recipient = parse_recipient(&req.recipient)?;
        let amount = parse_amount(&req.amount)?;
        let sender = self.sender()?;
        self.ensure_native_balance(sender, amount, &req.amount).await?;
        log_stage("transfer_btc", FlowStage::Validated);

        let _guard = self.nonce_lock.lock().await;
        let tx = self
            .prepare_tx(sender, recipient, amount, Bytes::new(), true)
            .await
            .map_err(|err| FlowError::chain("BTC Transaction Failed", err))?;
        let tx_hash = self
            .sign_and_broadcast("transfer_btc", tx)
            .await
            .map_err(|err| FlowError::chain("BTC Transaction Failed", err))?;
        Ok(FlowOutcome::Success {
            message: format!("BTC Transaction Successful! Hash: {}", tx_hash),
            tx_hash: Some(tx_hash),
        })
    }

    async fn try_transfer_musd(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<FlowOutcome, FlowError> {
        let req = extract_with(&self.transfer_extractor, ctx, prompt, "transaction").await?;
        log_stage("transfer_musd", FlowStage::Parsed);
        if !req.currency.trim().eq_ignore_ascii_case("musd") {
            return Err(FlowError::validation(
                "This function only supports mUSD transactions.",
            ));
        }
        let recipient = parse_recipient(&req.recipient)?;
        let amount = parse_amount(&req.amount)?;
        let sender = self.sender()?;
        log_stage("transfer_musd", FlowStage::Validated);

        let _guard = self.nonce_lock.lock().await;
        let tx = self
            .prepare_tx(
                sender,
                self.addresses.musd,
                U256::ZERO,
                transfer_calldata(recipient, amount),
                true,
            )
            .await
            .map_err(|err| FlowError::chain("Failed to prepare mUSD transaction", err))?;
        let tx_hash = self
            .sign_and_broadcast("transfer_musd", tx)
            .await
            .map_err(|err| FlowError::chain("mUSD Transaction Failed", err))?;
        Ok(FlowOutcome::Success {
            message: format!("mUSD Transaction Successful! Hash: {}", tx_hash),
            tx_hash: Some(tx_hash),
        })
    }

    /// Fails unless the sender holds at least `amount` native BTC.
    pub(crate) async fn ensure_native_balance(
        &self,
        sender: Address,
        amount: U256,
        requested: &str,
    ) -> Result<(), FlowError> {
        let balance = self
            .gateway
            .native_balance(sender)
            .await
            .map_err(|err| FlowError::chain("Failed to fetch BTC balance", err))?;
        if balance < amount {
            return Err(FlowError::validation(format!(
                "Insufficient BTC balance! You have {} BTC but need {} BTC.",
                format_base_units(balance),
                requested.trim()
            )));
        }
        Ok(())
    }

    /// Builds a transaction with the network gas price and the raw gas estimate.
    ///
    /// Callers must hold the nonce lock until the transaction is settled.
    pub(crate) async fn prepare_tx(
        &self,
        sender: Address,
        to: Address,
        value: U256,
        input: Bytes,
        pending_nonce: bool,
    ) -> Result<UnsignedTx, ChainError> {
        let nonce = self.gateway.next_nonce(sender, pending_nonce).await?;
        let gas_price = self.gateway.gas_price().await?;
        let gas_limit = self
            .gateway
            .estimate_gas(CallRequest {
                from: Some(sender),
                to,
                value,
                input: input.clone(),
            })
            .await?;
        Ok(UnsignedTx {
            to,
            value,
            input,
            gas_limit,
            gas_price,
            nonce,
            chain_id: self.chain_id(),
        })
    }
}

/// Sends native BTC on Mezo.
#[derive(Clone)]
pub struct TransferBtcTool {
    ledger: Arc<MezoLedger>,
    schema: serde_json::Value,
}

impl TransferBtcTool {
    pub const NAME: &'static str = "mezo_transfer_btc";

    pub fn new(ledger: Arc<MezoLedger>) -> Self {
        Self {
            ledger,
            schema: gen_schema_for::<PromptArgs>(),
        }
    }
}

impl Tool<EngineCtx> for TransferBtcTool {
    type Args = PromptArgs;
    type Output = FlowOutcome;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        "Sends BTC on Mezo Matsnet. Parses a transaction request with the amount, \
        the currency (BTC) and the recipient address, then executes the transfer."
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
        Ok(self.ledger.transfer_btc(&ctx, args.prompt).await)
    }
}

/// Sends mUSD on Mezo.
#[derive(Clone)]
pub struct TransferMusdTool {
    ledger: Arc<MezoLedger>,
    schema: serde_json::Value,
}

impl TransferMusdTool {
    pub const NAME: &'static str = "mezo_transfer_musd";

    pub fn new(ledger: Arc<MezoLedger>) -> Self {
        Self {
            ledger,
            schema: gen_schema_for::<PromptArgs>(),
        }
    }
}

impl Tool<EngineCtx> for TransferMusdTool {
    type Args = PromptArgs;
    type Output = FlowOutcome;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        "Sends mUSD on Mezo Matsnet. The prompt should contain the amount, \
        the currency (which must be mUSD) and the recipient's wallet address."
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
        Ok(self.ledger.transfer_musd(&ctx, args.prompt).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ErrorKind, mock::*};
    use mezo_engine::{engine::EngineBuilder, model::Model};

    #[tokio::test]
    async fn test_transfer_btc() {
        let gateway = Arc::new(FakeGateway {
            native: wei("2"),
            ..Default::default()
        });
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        let model = model(transfer_args("1.5", "BTC"));

        let res = ledger
            .transfer_btc(&model, "Send 1.5 BTC to 0x2222".to_string())
            .await;
        let tx_hash = res.tx_hash().unwrap();
        assert_eq!(
            res.to_string(),
            format!("✅ BTC Transaction Successful! Hash: {}", tx_hash)
        );
        assert_eq!(
            gateway.ops(),
            vec![
                "native_balance",
                "nonce_pending",
                "gas_price",
                "estimate_gas",
                "sign_and_send"
            ]
        );
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, recipient());
        assert_eq!(sent[0].value, U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(sent[0].gas_limit, 21000);
        assert_eq!(sent[0].chain_id, 31611);
        assert!(sent[0].input.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_btc_rejects() {
        // currency mismatch: nothing reaches the chain
        let gateway = Arc::new(FakeGateway::default());
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        let res = ledger
            .transfer_btc(&model(transfer_args("1", "mUSD")), "Send 1 mUSD".to_string())
            .await;
        assert_eq!(
            res,
            FlowOutcome::Failure {
                kind: ErrorKind::Validation,
                message: "This function only supports BTC transactions.".to_string()
            }
        );
        assert!(gateway.ops().is_empty());

        // insufficient balance: no transaction is built
        let gateway = Arc::new(FakeGateway {
            native: wei("0.5"),
            ..Default::default()
        });
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        let res = ledger
            .transfer_btc(&model(transfer_args("1.5", "btc")), "Send 1.5 BTC".to_string())
            .await;
        assert_eq!(
            res.to_string(),
            "❌ Insufficient BTC balance! You have 0.5 BTC but need 1.5 BTC."
        );
        assert_eq!(gateway.ops(), vec!["native_balance"]);
        assert!(gateway.sent().is_empty());

        // sub-wei amounts never reach the chain as a zero-value transfer
        let gateway = Arc::new(FakeGateway {
            native: wei("2"),
            ..Default::default()
        });
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        for amount in ["0.0000000000000000009", "0"] {
            let res = ledger
                .transfer_btc(&model(transfer_args(amount, "btc")), "Send dust".to_string())
                .await;
            match res {
                FlowOutcome::Failure { kind, message } => {
                    assert_eq!(kind, ErrorKind::Validation);
                    assert!(message.starts_with(&format!("Invalid amount '{}'", amount)));
                }
                _ => panic!("expected failure"),
            }
        }
        assert!(gateway.ops().is_empty());
        assert!(gateway.sent().is_empty());

        // extraction failure
        let res = ledger
            .transfer_btc(&Model::not_implemented(), "Send".to_string())
            .await;
        match res {
            FlowOutcome::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::Extraction);
                assert!(message.starts_with("Failed to extract transaction details: "));
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_transfer_btc_reverted() {
        let gateway = Arc::new(FakeGateway {
            native: wei("2"),
            revert_at: Some(0),
            ..Default::default()
        });
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        let res = ledger
            .transfer_btc(&model(transfer_args("1", "btc")), "Send 1 BTC".to_string())
            .await;
        match res {
            FlowOutcome::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::OnChain);
                assert!(message.starts_with("BTC Transaction Failed: transaction 0x"));
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_transfer_musd() {
        let gateway = Arc::new(FakeGateway::default());
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        let res = ledger
            .transfer_musd(&model(transfer_args("25", "musd")), "Send 25 mUSD".to_string())
            .await;
        assert!(res.is_success());
        assert!(res.to_string().starts_with("✅ mUSD Transaction Successful! Hash: 0x"));
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, crate::MUSD_ADDRESS);
        assert_eq!(sent[0].value, U256::ZERO);
        assert_eq!(sent[0].input, transfer_calldata(recipient(), wei("25")));

        let res = ledger
            .transfer_musd(&model(transfer_args("25", "btc")), "Send 25 BTC".to_string())
            .await;
        assert_eq!(
            res.to_string(),
            "❌ This function only supports mUSD transactions."
        );

        // estimation failure is a preparation failure
        let gateway = Arc::new(FakeGateway {
            estimate: None,
            ..Default::default()
        });
        let ledger = fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true))));
        let res = ledger
            .transfer_musd(&model(transfer_args("25", "musd")), "Send 25 mUSD".to_string())
            .await;
        assert!(
            res.to_string()
                .starts_with("❌ Failed to prepare mUSD transaction: rpc eth_estimateGas failed")
        );
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flows_take_distinct_nonces() {
        let gateway = Arc::new(FakeGateway {
            native: wei("100"),
            allowance: wei("100"),
            ..Default::default()
        });
        let ledger = Arc::new(fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true)))));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let model = model(transfer_args("1", "btc"));
                    ledger.transfer_btc(&model, "Send 1 BTC".to_string()).await
                } else {
                    let model = model(serde_json::json!({
                        "amount": "1",
                        "from_currency": "mUSD",
                        "to_currency": "BTC",
                        "router_address": crate::ROUTER_ADDRESS.to_string(),
                    }));
                    ledger.swap_musd_btc(&model, "Swap 1 mUSD".to_string()).await
                }
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_success());
        }

        let mut nonces: Vec<u64> = gateway.sent().iter().map(|tx| tx.nonce).collect();
        nonces.sort_unstable();
        assert_eq!(nonces, (7..15).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_transfer_tool() {
        let gateway = Arc::new(FakeGateway {
            native: wei("1"),
            ..Default::default()
        });
        let ledger = Arc::new(fake_ledger(gateway.clone(), Arc::new(FakeConfirmer::new(Ok(true)))));
        let engine = EngineBuilder::new()
            .with_model(Model::with_completer(scripted(
                transfer_args("0.01", "BTC"),
                None,
            )))
            .register_tool(TransferBtcTool::new(ledger.clone()))
            .unwrap()
            .register_tool(TransferMusdTool::new(ledger))
            .unwrap()
            .build();

        let (text, json) = engine
            .tool_call(
                TransferBtcTool::NAME,
                r#"{"prompt":"Send 0.01 BTC to 0x2222"}"#.to_string(),
            )
            .await
            .unwrap();
        assert!(text.starts_with("✅ BTC Transaction Successful! Hash: 0x"));
        assert!(json.contains(r#""status":"success""#));
        assert_eq!(gateway.sent()[0].value, wei("0.01"));
    }
}
