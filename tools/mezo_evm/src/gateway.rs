//! Chain gateway: the only component that talks JSON-RPC.
//!
//! [`ChainGateway`] is object safe so the transaction flows can run against
//! [`RpcGateway`] in production and against in-memory doubles in tests.
//! Idempotent reads are retried once; submission never is.

use alloy::{
    consensus::{SignableTransaction as _, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718 as _,
    network::{ReceiptResponse as _, TransactionBuilder as _},
    primitives::{Address, B256, Bytes, TxKind, U256},
    providers::{Provider as _, RootProvider},
    rpc::{client::RpcClient, types::TransactionRequest},
    signers::{SignerSync as _, local::PrivateKeySigner},
    transports::http::{Http, reqwest},
};
use mezo_core::{BoxError, BoxPinFut};
use serde::Serialize;
use std::{fmt::Display, future::Future, str::FromStr, time::Duration};

use crate::{MEZO_CHAIN_ID, MEZO_RPC_URL};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors raised by a [`ChainGateway`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("no signing key loaded, set PRIVATE_KEY in the environment")]
    MissingCredential,

    #[error("invalid signing key: {0}")]
    InvalidCredential(String),

    #[error("rpc {op} failed: {error}")]
    Rpc { op: &'static str, error: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transaction rejected: {0}")]
    Broadcast(String),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    #[error("no receipt for transaction {tx_hash} after {secs}s")]
    ReceiptTimeout { tx_hash: B256, secs: u64 },
}

/// A read-only call or a gas estimation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

impl CallRequest {
    fn into_tx_request(self) -> TransactionRequest {
        let mut req = TransactionRequest::default()
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.input);
        if let Some(from) = self.from {
            req = req.with_from(from);
        }
        req
    }
}

/// A fully specified legacy (EIP-155) transaction, ready to be signed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    #[serde(rename = "gas")]
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

/// Access to the chain for a single signing identity.
pub trait ChainGateway: Send + Sync + 'static {
    /// Chain id put on every built transaction
    fn chain_id(&self) -> u64;

    /// Address of the signing identity
    fn sender(&self) -> Result<Address, ChainError>;

    fn native_balance(&self, address: Address) -> BoxPinFut<Result<U256, ChainError>>;

    /// Executes a read-only contract call and returns the raw return data
    fn call(&self, req: CallRequest) -> BoxPinFut<Result<Bytes, ChainError>>;

    /// Network-suggested gas price, in wei
    fn gas_price(&self) -> BoxPinFut<Result<u128, ChainError>>;

    fn estimate_gas(&self, req: CallRequest) -> BoxPinFut<Result<u64, ChainError>>;

    /// Transaction count of `address`, including pending transactions when `pending` is set
    fn next_nonce(&self, address: Address, pending: bool) -> BoxPinFut<Result<u64, ChainError>>;

    /// Signs and submits the transaction, then waits for its receipt.
    ///
    /// Resolves to the transaction hash only when the receipt reports success.
    fn sign_and_send(&self, tx: UnsignedTx) -> BoxPinFut<Result<B256, ChainError>>;

    /// Gas estimate plus `buffer`, or `fallback` when the estimation fails
    fn estimate_gas_buffered(
        &self,
        req: CallRequest,
        buffer: u64,
        fallback: u64,
    ) -> BoxPinFut<u64> {
        let fut = self.estimate_gas(req);
        Box::pin(async move {
            match fut.await {
                Ok(gas) => gas.saturating_add(buffer),
                Err(err) => {
                    log::warn!(fallback = fallback; "gas estimation failed: {}", err);
                    fallback
                }
            }
        })
    }
}

/// Settings for [`RpcGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Timeout of each JSON-RPC request
    pub request_timeout: Duration,
    /// Upper bound on the wait for a transaction receipt
    pub receipt_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: MEZO_RPC_URL.to_string(),
            chain_id: MEZO_CHAIN_ID,
            request_timeout: Duration::from_secs(20),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// Parses a hex private key; an empty or absent key yields `None`.
pub fn load_signer(key: Option<&str>) -> Result<Option<PrivateKeySigner>, ChainError> {
    match key.map(str::trim) {
        None | Some("") => Ok(None),
        Some(key) => PrivateKeySigner::from_str(key)
            .map(Some)
            .map_err(|err| ChainError::InvalidCredential(err.to_string())),
    }
}

/// [`ChainGateway`] over an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcGateway {
    provider: RootProvider,
    signer: Option<PrivateKeySigner>,
    chain_id: u64,
    receipt_timeout: Duration,
}

impl RpcGateway {
    pub fn new(cfg: &GatewayConfig, signer: Option<PrivateKeySigner>) -> Result<Self, BoxError> {
        let url: reqwest::Url = cfg.rpc_url.parse()?;
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let http = Http::with_client(client, url);
        let rpc_client = RpcClient::new(http, false);
        if signer.is_none() {
            log::warn!("PRIVATE_KEY not set, transactions requiring signing will fail");
        }

        Ok(Self {
            provider: RootProvider::new(rpc_client),
            signer,
            chain_id: cfg.chain_id,
            receipt_timeout: cfg.receipt_timeout,
        })
    }
}

/// Runs an idempotent read, retrying it once on failure.
async fn read_with_retry<T, E, F, Fut>(op: &'static str, f: F) -> Result<T, ChainError>
where
    E: Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match f().await {
        Ok(v) => Ok(v),
        Err(err) => {
            log::warn!(op = op; "rpc read failed, retrying once: {}", err);
            f().await.map_err(|err| ChainError::Rpc {
                op,
                error: err.to_string(),
            })
        }
    }
}

impl ChainGateway for RpcGateway {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Result<Address, ChainError> {
        self.signer
            .as_ref()
            .map(|s| s.address())
            .ok_or(ChainError::MissingCredential)
    }

    fn native_balance(&self, address: Address) -> BoxPinFut<Result<U256, ChainError>> {
        let provider = self.provider.clone();
        Box::pin(async move {
            read_with_retry("eth_getBalance", || async {
                provider.get_balance(address).await
            })
            .await
        })
    }

    fn call(&self, req: CallRequest) -> BoxPinFut<Result<Bytes, ChainError>> {
        let provider = self.provider.clone();
        let tx = req.into_tx_request();
        Box::pin(async move {
            read_with_retry("eth_call", || async { provider.call(tx.clone()).await }).await
        })
    }

    fn gas_price(&self) -> BoxPinFut<Result<u128, ChainError>> {
        let provider = self.provider.clone();
        Box::pin(async move {
            read_with_retry("eth_gasPrice", || async { provider.get_gas_price().await }).await
        })
    }

    fn estimate_gas(&self, req: CallRequest) -> BoxPinFut<Result<u64, ChainError>> {
        let provider = self.provider.clone();
        let tx = req.into_tx_request();
        Box::pin(async move {
            provider
                .estimate_gas(tx)
                .await
                .map_err(|err| ChainError::Rpc {
                    op: "eth_estimateGas",
                    error: err.to_string(),
                })
        })
    }

    fn next_nonce(&self, address: Address, pending: bool) -> BoxPinFut<Result<u64, ChainError>> {
        let provider = self.provider.clone();
        Box::pin(async move {
            read_with_retry("eth_getTransactionCount", || async {
                if pending {
                    provider.get_transaction_count(address).pending().await
                } else {
                    provider.get_transaction_count(address).latest().await
                }
            })
            .await
        })
    }

    fn sign_and_send(&self, tx: UnsignedTx) -> BoxPinFut<Result<B256, ChainError>> {
        let provider = self.provider.clone();
        let signer = self.signer.clone();
        let receipt_timeout = self.receipt_timeout;
        Box::pin(async move {
            let signer = signer.ok_or(ChainError::MissingCredential)?;
            let legacy = TxLegacy {
                chain_id: Some(tx.chain_id),
                nonce: tx.nonce,
                gas_price: tx.gas_price,
                gas_limit: tx.gas_limit,
                to: TxKind::Call(tx.to),
                value: tx.value,
                input: tx.input,
            };
            let hash = legacy.signature_hash();
            let sig = signer
                .sign_hash_sync(&hash)
                .map_err(|err| ChainError::Signing(err.to_string()))?;
            let signed = legacy.into_signed(sig);
            let tx_hash = *signed.hash();
            let raw = TxEnvelope::Legacy(signed).encoded_2718();

            provider
                .send_raw_transaction(&raw)
                .await
                .map_err(|err| ChainError::Broadcast(err.to_string()))?;
            log::info!(tx_hash = tx_hash.to_string(), nonce = tx.nonce; "transaction submitted");

            let wait = async {
                loop {
                    match provider.get_transaction_receipt(tx_hash).await {
                        Ok(Some(receipt)) => return receipt,
                        Ok(None) => {}
                        Err(err) => {
                            log::warn!(tx_hash = tx_hash.to_string(); "receipt poll failed: {}", err);
                        }
                    }
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
            };
            let receipt = tokio::time::timeout(receipt_timeout, wait)
                .await
                .map_err(|_| ChainError::ReceiptTimeout {
                    tx_hash,
                    secs: receipt_timeout.as_secs(),
                })?;

            if !receipt.status() {
                return Err(ChainError::Reverted { tx_hash });
            }
            log::info!(
                tx_hash = tx_hash.to_string(),
                gas_used = receipt.gas_used;
                "transaction settled"
            );
            Ok(tx_hash)
        })
    }
}
