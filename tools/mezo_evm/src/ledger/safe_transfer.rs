use alloy::primitives::Bytes;
use mezo_core::{
    BoxError, CompletionFeatures, CompletionRequest, FunctionDefinition, Tool, gen_schema_for,
};
use mezo_engine::engine::EngineCtx;
use std::sync::Arc;

use super::{
    ErrorKind, FlowError, FlowOutcome, FlowStage, MezoLedger, PromptArgs, extract_with, finish,
    log_stage, parse_amount, parse_recipient,
};
use crate::gateway::UnsignedTx;

pub static EXPLANATION_UNAVAILABLE: &str = "LLM explanation unavailable.";

fn explanation_prompt(tx: &UnsignedTx, amount: &str) -> String {
    format!(
        "You are given the following transaction data on Mezo Matsnet:\n\
        - Recipient: {}\n\
        - Amount (BTC): {}\n\
        - Gas Price: {}\n\
        - Gas Limit: {}\n\
        - Nonce: {}\n\
        - Chain ID: {} (Mezo Testnet)\n\n\
        Explain these details in a user-friendly way, covering:\n\
        1. The purpose of each field (nonce, gas, etc.).\n\
        2. Potential fees (approximate cost) or any known risks.\n\
        3. A short summary of what will happen if the user confirms.\n\n\
        Use a concise and helpful tone.",
        tx.to, amount, tx.gas_price, tx.gas_limit, tx.nonce, tx.chain_id
    )
}

impl MezoLedger {
    /// Sends native BTC only after the user approves the unsigned transaction
    /// and a plain-language explanation of it.
    pub async fn safe_transfer_btc(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> FlowOutcome {
        finish(
            "safe_transfer_btc",
            self.try_safe_transfer_btc(ctx, prompt).await,
        )
    }

    async fn try_safe_transfer_btc(
        &self,
        ctx: &impl CompletionFeatures,
        prompt: String,
    ) -> Result<FlowOutcome, FlowError> {
        let req = extract_with(&self.transfer_extractor, ctx, prompt, "transaction").await?;
        log_stage("safe_transfer_btc", FlowStage::Parsed);
        if !req.currency.trim().eq_ignore_ascii_case("btc") {
            return Err(FlowError::validation(
                "This function only supports BTC transactions.",
            ));
        }
        let recipient = parse_recipient(&req.recipient)?;
        let amount = parse_amount(&req.amount)?;
        let sender = self.sender()?;
        self.ensure_native_balance(sender, amount, &req.amount).await?;
        log_stage("safe_transfer_btc", FlowStage::Validated);

        // held through the confirmation so the shown nonce stays valid
        let _guard = self.nonce_lock.lock().await;
        let tx = self
            .prepare_tx(sender, recipient, amount, Bytes::new(), false)
            .await
            .map_err(|err| FlowError::chain("BTC Transaction Failed", err))?;

        let explanation = self.explain(ctx, &tx, req.amount.trim()).await;
        match self.confirmer.confirm(&tx, &explanation).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(FlowError::new(
                    ErrorKind::Aborted,
                    "Transaction aborted by user.",
                ));
            }
            Err(err) => {
                return Err(FlowError::new(
                    ErrorKind::Transport,
                    format!("Could not read the confirmation, nothing was sent: {}", err),
                ));
            }
        }
        log_stage("safe_transfer_btc", FlowStage::Confirmed);

        let tx_hash = self
            .sign_and_broadcast("safe_transfer_btc", tx)
            .await
            .map_err(|err| FlowError::chain("BTC Transaction Failed", err))?;
        Ok(FlowOutcome::Success {
            message: format!("BTC Transaction Successful! Hash: {}", tx_hash),
            tx_hash: Some(tx_hash),
        })
    }

    async fn explain(&self, ctx: &impl CompletionFeatures, tx: &UnsignedTx, amount: &str) -> String {
        let req = CompletionRequest {
            prompt: explanation_prompt(tx, amount),
            temperature: Some(0.0),
            ..Default::default()
        };
        match ctx.completion(req).await {
            Ok(res) if res.failed_reason.is_none() && !res.content.trim().is_empty() => res.content,
            Ok(res) => {
                log::warn!(reason = res.failed_reason.as_deref().unwrap_or_default(); "explanation unavailable");
                EXPLANATION_UNAVAILABLE.to_string()
            }
            Err(err) => {
                log::warn!("explanation unavailable: {}", err);
                EXPLANATION_UNAVAILABLE.to_string()
            }
        }
    }
}

/// Sends native BTC after an explained, human-confirmed review.
#[derive(Clone)]
pub struct SafeTransferBtcTool {
    ledger: Arc<MezoLedger>,
    schema: serde_json::Value,
}

impl SafeTransferBtcTool {
    pub const NAME: &'static str = "mezo_safe_transfer_btc";

    pub fn new(ledger: Arc<MezoLedger>) -> Self {
        Self {
            ledger,
            schema: gen_schema_for::<PromptArgs>(),
        }
    }
}

impl Tool<EngineCtx> for SafeTransferBtcTool {
    type Args = PromptArgs;
    type Output = FlowOutcome;

    fn name(&self) -> String {
        Self::NAME.to_string()
    }

    fn description(&self) -> String {
        "Sends BTC on Mezo Matsnet in safe mode: the transaction is explained \
        and the user must confirm it before it is signed."
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
        Ok(self.ledger.safe_transfer_btc(&ctx, args.prompt).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::*;
    use mezo_engine::model::Model;

    #[tokio::test]
    async fn test_safe_transfer_confirmed() {
        let gateway = Arc::new(FakeGateway {
            native: wei("1"),
            ..Default::default()
        });
        let confirmer = Arc::new(FakeConfirmer::new(Ok(true)));
        let ledger = fake_ledger(gateway.clone(), confirmer.clone());
        let completer = scripted(transfer_args("0.25", "BTC"), Some("Sends 0.25 BTC."));
        let model = Model::with_completer(completer.clone());

        let res = ledger
            .safe_transfer_btc(&model, "Send 0.25 BTC to 0x2222".to_string())
            .await;
        assert!(res.is_success());
        assert!(
            res.to_string()
                .starts_with("✅ BTC Transaction Successful! Hash: 0x")
        );
        assert_eq!(
            gateway.ops(),
            vec![
                "native_balance",
                "nonce_latest",
                "gas_price",
                "estimate_gas",
                "sign_and_send"
            ]
        );

        let seen = confirmer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, gateway.sent()[0]);
        assert_eq!(seen[0].1, "Sends 0.25 BTC.");

        let requests = completer.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let prompt = &requests[1].prompt;
        assert!(prompt.contains("- Amount (BTC): 0.25"));
        assert!(prompt.contains("- Nonce: 7"));
        assert!(prompt.contains("- Chain ID: 31611 (Mezo Testnet)"));
    }

    #[tokio::test]
    async fn test_safe_transfer_declined() {
        let expected = [
            FlowOutcome::Failure {
                kind: ErrorKind::Aborted,
                message: "Transaction aborted by user.".to_string(),
            },
            FlowOutcome::Failure {
                kind: ErrorKind::Transport,
                message: "Could not read the confirmation, nothing was sent: stdin closed"
                    .to_string(),
            },
        ];
        for (answer, expected) in [Ok(false), Err("stdin closed".to_string())]
            .into_iter()
            .zip(expected)
        {
            let gateway = Arc::new(FakeGateway {
                native: wei("1"),
                ..Default::default()
            });
            let confirmer = Arc::new(FakeConfirmer::new(answer));
            let ledger = fake_ledger(gateway.clone(), confirmer.clone());
            // no free-text reply: the explanation falls back
            let res = ledger
                .safe_transfer_btc(&model(transfer_args("0.25", "btc")), "Send".to_string())
                .await;
            assert_eq!(res, expected);
            assert!(gateway.sent().is_empty());
            assert!(!gateway.ops().contains(&"sign_and_send"));
            assert_eq!(
                confirmer.seen.lock().unwrap()[0].1,
                EXPLANATION_UNAVAILABLE
            );
        }
    }

    #[tokio::test]
    async fn test_safe_transfer_insufficient() {
        let gateway = Arc::new(FakeGateway {
            native: wei("0.1"),
            ..Default::default()
        });
        let confirmer = Arc::new(FakeConfirmer::new(Ok(true)));
        let ledger = fake_ledger(gateway.clone(), confirmer.clone());
        let res = ledger
            .safe_transfer_btc(&model(transfer_args("0.25", "btc")), "Send".to_string())
            .await;
        assert_eq!(
            res.to_string(),
            "❌ Insufficient BTC balance! You have 0.1 BTC but need 0.25 BTC."
        );
        assert!(confirmer.seen.lock().unwrap().is_empty());
        assert!(gateway.sent().is_empty());
    }
}
