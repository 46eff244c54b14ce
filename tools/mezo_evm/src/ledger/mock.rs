//! In-memory doubles for the ledger tests.

use alloy::{
    primitives::{Address, B256, Bytes, U256},
    sol_types::SolCall,
};
use mezo_core::{AgentOutput, BoxError, BoxPinFut, CompletionRequest, ToolCall};
use mezo_engine::model::{CompletionFeaturesDyn, Model};
use serde_json::json;
use std::sync::{Arc, Mutex};

use super::{Confirmer, MezoAddresses, MezoLedger};
use crate::{
    directory::{TokenDirectory, tests::FakeGraph},
    erc20::IERC20,
    gateway::{CallRequest, ChainError, ChainGateway, UnsignedTx},
};

pub(crate) fn sender() -> Address {
    Address::repeat_byte(0x11)
}

pub(crate) fn recipient() -> Address {
    Address::repeat_byte(0x22)
}

pub(crate) fn wei(amount: &str) -> U256 {
    crate::helper::to_base_units(amount).unwrap()
}

/// Chain double: records every gateway operation and every submitted tx.
pub(crate) struct FakeGateway {
    pub ops: Mutex<Vec<&'static str>>,
    pub sent: Mutex<Vec<UnsignedTx>>,
    pub native: U256,
    pub token: U256,
    pub allowance: U256,
    /// `None` makes estimation fail
    pub estimate: Option<u64>,
    /// Index of the submission that reverts
    pub revert_at: Option<usize>,
    pub signer: Option<Address>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            native: U256::ZERO,
            token: U256::ZERO,
            allowance: U256::ZERO,
            estimate: Some(21000),
            revert_at: None,
            signer: Some(sender()),
        }
    }
}

impl FakeGateway {
    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<UnsignedTx> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str) {
        self.ops.lock().unwrap().push(op);
    }
}

impl ChainGateway for FakeGateway {
    fn chain_id(&self) -> u64 {
        crate::MEZO_CHAIN_ID
    }

    fn sender(&self) -> Result<Address, ChainError> {
        self.signer.ok_or(ChainError::MissingCredential)
    }

    fn native_balance(&self, _address: Address) -> BoxPinFut<Result<U256, ChainError>> {
        self.record("native_balance");
        Box::pin(futures::future::ready(Ok(self.native)))
    }

    fn call(&self, req: CallRequest) -> BoxPinFut<Result<Bytes, ChainError>> {
        self.record("call");
        let value = if req.input.starts_with(&IERC20::allowanceCall::SELECTOR) {
            self.allowance
        } else {
            self.token
        };
        let data = Bytes::from(value.to_be_bytes::<32>().to_vec());
        Box::pin(futures::future::ready(Ok(data)))
    }

    fn gas_price(&self) -> BoxPinFut<Result<u128, ChainError>> {
        self.record("gas_price");
        Box::pin(futures::future::ready(Ok(1_000_000_000)))
    }

    fn estimate_gas(&self, _req: CallRequest) -> BoxPinFut<Result<u64, ChainError>> {
        self.record("estimate_gas");
        let res = self.estimate.ok_or(ChainError::Rpc {
            op: "eth_estimateGas",
            error: "execution reverted".to_string(),
        });
        Box::pin(futures::future::ready(res))
    }

    fn next_nonce(&self, _address: Address, pending: bool) -> BoxPinFut<Result<u64, ChainError>> {
        self.record(if pending { "nonce_pending" } else { "nonce_latest" });
        let nonce = self.sent.lock().unwrap().len() as u64 + 7;
        Box::pin(futures::future::ready(Ok(nonce)))
    }

    fn sign_and_send(&self, tx: UnsignedTx) -> BoxPinFut<Result<B256, ChainError>> {
        self.record("sign_and_send");
        let mut sent = self.sent.lock().unwrap();
        let tx_hash = B256::with_last_byte(tx.nonce as u8);
        let index = sent.len();
        sent.push(tx);
        let res = if self.revert_at == Some(index) {
            Err(ChainError::Reverted { tx_hash })
        } else {
            Ok(tx_hash)
        };
        Box::pin(futures::future::ready(res))
    }
}

/// Confirmation double with a fixed answer.
pub(crate) struct FakeConfirmer {
    pub answer: Result<bool, String>,
    pub seen: Mutex<Vec<(UnsignedTx, String)>>,
}

impl FakeConfirmer {
    pub fn new(answer: Result<bool, String>) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Confirmer for FakeConfirmer {
    fn confirm(&self, tx: &UnsignedTx, explanation: &str) -> BoxPinFut<Result<bool, BoxError>> {
        self.seen
            .lock()
            .unwrap()
            .push((tx.clone(), explanation.to_string()));
        let res = self.answer.clone().map_err(BoxError::from);
        Box::pin(futures::future::ready(res))
    }
}

/// Model double: answers tool requests with the scripted arguments and
/// free-text requests with `reply`.
pub(crate) struct ScriptedModel {
    pub args: String,
    pub reply: Option<String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl CompletionFeaturesDyn for ScriptedModel {
    fn completion(&self, req: CompletionRequest) -> BoxPinFut<Result<AgentOutput, BoxError>> {
        let res = match req.tools.first() {
            Some(tool) => Ok(AgentOutput {
                tool_calls: Some(vec![ToolCall {
                    id: "call_1".to_string(),
                    name: tool.name.clone(),
                    args: self.args.clone(),
                    result: None,
                }]),
                ..Default::default()
            }),
            None => match &self.reply {
                Some(content) => Ok(AgentOutput {
                    content: content.clone(),
                    ..Default::default()
                }),
                None => Err("model unavailable".into()),
            },
        };
        self.requests.lock().unwrap().push(req);
        Box::pin(futures::future::ready(res))
    }
}

pub(crate) fn scripted(args: serde_json::Value, reply: Option<&str>) -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel {
        args: args.to_string(),
        reply: reply.map(|s| s.to_string()),
        requests: Mutex::new(Vec::new()),
    })
}

pub(crate) fn model(args: serde_json::Value) -> Model {
    Model::with_completer(scripted(args, None))
}

pub(crate) fn transfer_args(amount: &str, currency: &str) -> serde_json::Value {
    json!({
        "amount": amount,
        "currency": currency,
        "recipient": recipient().to_string(),
    })
}

pub(crate) fn fake_ledger(gateway: Arc<FakeGateway>, confirmer: Arc<FakeConfirmer>) -> MezoLedger {
    MezoLedger::new(
        gateway,
        TokenDirectory::new(Arc::new(FakeGraph::default())),
        confirmer,
        MezoAddresses::default(),
    )
}
