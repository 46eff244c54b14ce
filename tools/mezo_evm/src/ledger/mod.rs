//! Transaction flows on the Mezo chain
//!
//! [`MezoLedger`] owns everything a flow needs: the chain gateway, the token
//! directory, the confirmation prompt and the structured extractors. Each flow
//! turns a natural-language request into a [`FlowOutcome`]:
//!
//! `parsed → validated → [confirmed] → broadcast → settled | failed`
//!
//! Only the safe BTC transfer passes through `confirmed`. Every write path holds
//! the ledger's nonce lock from nonce fetch to receipt, so concurrent flows on
//! one signing identity never share a nonce.
//!
//! The flows are exposed as tools taking a single `prompt` argument:
//! - [`TransferBtcTool`], [`TransferMusdTool`]
//! - [`SwapMusdBtcTool`]
//! - [`SafeTransferBtcTool`]
//! - [`TokenBalanceTool`]
//! - [`TokenPriceTool`]

use alloy::primitives::{Address, B256};
use mezo_core::{BoxError, BoxPinFut, CompletionFeatures};
use mezo_engine::extension::extractor::Extractor;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};

use crate::{
    MUSD_ADDRESS, ROUTER_ADDRESS, WRAPPED_BTC_ADDRESS,
    directory::{DirectoryError, TokenDirectory},
    gateway::{ChainError, ChainGateway, UnsignedTx},
};

pub mod balance;
pub mod price;
pub mod safe_transfer;
pub mod swap;
pub mod transfer;

pub use balance::*;
pub use price::*;
pub use safe_transfer::*;
pub use swap::*;
pub use transfer::*;

/// Failure classes of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The model reply could not be read as the expected fields
    Extraction,
    /// The request breaks a business rule
    Validation,
    /// An RPC node, the index or the terminal failed or rejected the request
    Transport,
    /// The transaction was mined with a failed status
    OnChain,
    /// The user declined the confirmation
    Aborted,
}

/// Result of a flow, rendered with a fixed ✅ or ❌ marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowOutcome {
    Success {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<B256>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Success { .. })
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            FlowOutcome::Success { tx_hash, .. } => *tx_hash,
            FlowOutcome::Failure { .. } => None,
        }
    }
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowOutcome::Success { message, .. } => write!(f, "✅ {}", message),
            FlowOutcome::Failure { message, .. } => write!(f, "❌ {}", message),
        }
    }
}

impl From<Result<FlowOutcome, FlowError>> for FlowOutcome {
    fn from(res: Result<FlowOutcome, FlowError>) -> Self {
        match res {
            Ok(outcome) => outcome,
            Err(err) => FlowOutcome::Failure {
                kind: err.kind,
                message: err.message,
            },
        }
    }
}

/// A flow failure with its user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FlowError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FlowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extraction, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Wraps a gateway error under a context message, e.g. "Approval failed".
    pub fn chain(context: &str, err: ChainError) -> Self {
        Self::new(chain_error_kind(&err), format!("{}: {}", context, err))
    }
}

/// Maps a gateway error to its failure class.
pub fn chain_error_kind(err: &ChainError) -> ErrorKind {
    match err {
        ChainError::MissingCredential | ChainError::InvalidCredential(_) => ErrorKind::Validation,
        ChainError::Reverted { .. } => ErrorKind::OnChain,
        ChainError::Rpc { .. }
        | ChainError::Signing(_)
        | ChainError::Broadcast(_)
        | ChainError::ReceiptTimeout { .. } => ErrorKind::Transport,
    }
}

/// Maps a directory error to its failure class.
pub fn directory_error_kind(err: &DirectoryError) -> ErrorKind {
    match err {
        DirectoryError::NotFound { .. }
        | DirectoryError::PriceNotFound(_)
        | DirectoryError::InvalidAddress { .. } => ErrorKind::Validation,
        DirectoryError::Transport(_) | DirectoryError::Malformed(_) => ErrorKind::Transport,
    }
}

/// Flow states, as recorded in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Parsed,
    Validated,
    Confirmed,
    Signed,
    Broadcast,
    Settled,
    Failed,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowStage::Parsed => "parsed",
            FlowStage::Validated => "validated",
            FlowStage::Confirmed => "confirmed",
            FlowStage::Signed => "signed",
            FlowStage::Broadcast => "broadcast",
            FlowStage::Settled => "settled",
            FlowStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub(crate) fn log_stage(flow: &str, stage: FlowStage) {
    log::info!(flow = flow, stage = stage.to_string(); "flow stage");
}

/// Records the terminal stage of a flow and renders its outcome.
pub(crate) fn finish(flow: &str, res: Result<FlowOutcome, FlowError>) -> FlowOutcome {
    match &res {
        Ok(outcome) => {
            if outcome.tx_hash().is_some() {
                log_stage(flow, FlowStage::Settled);
            }
        }
        Err(err) => {
            log::warn!(flow = flow, stage = FlowStage::Failed.to_string(), kind = format!("{:?}", err.kind); "{}", err.message);
        }
    }
    res.into()
}

/// Human approval of a transaction before it is signed.
pub trait Confirmer: Send + Sync + 'static {
    /// Shows the transaction and its explanation; resolves to `true` only on approval
    fn confirm(&self, tx: &UnsignedTx, explanation: &str) -> BoxPinFut<Result<bool, BoxError>>;
}

/// Asks for confirmation on the terminal.
#[derive(Debug, Clone, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, tx: &UnsignedTx, explanation: &str) -> BoxPinFut<Result<bool, BoxError>> {
        let raw = serde_json::to_string_pretty(tx);
        let explanation = explanation.to_string();
        Box::pin(async move {
            let raw = raw?;
            let answer = tokio::task::spawn_blocking(move || {
                println!("\n--- BTC Transaction Data ---\n{}\n----------------------------", raw);
                println!("\n--- LLM Analysis ---\n{}\n--------------------", explanation);
                print!("Do you want to proceed with this BTC transaction? [y/n]: ");
                std::io::Write::flush(&mut std::io::stdout())?;
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
                Ok::<String, std::io::Error>(line)
            })
            .await??;
            Ok(answer.trim().eq_ignore_ascii_case("y"))
        })
    }
}

/// Contract addresses used by the flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MezoAddresses {
    pub musd: Address,
    pub wrapped_btc: Address,
    pub router: Address,
}

impl Default for MezoAddresses {
    fn default() -> Self {
        Self {
            musd: MUSD_ADDRESS,
            wrapped_btc: WRAPPED_BTC_ADDRESS,
            router: ROUTER_ADDRESS,
        }
    }
}

/// Transfer fields extracted from a request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct TransferRequest {
    /// The amount of cryptocurrency to transfer, as a decimal string, e.g. "1.5"
    pub amount: String,
    /// The cryptocurrency (BTC or mUSD)
    pub currency: String,
    /// The recipient's wallet address
    pub recipient: String,
}

/// Swap fields extracted from a request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct SwapRequest {
    /// The amount of mUSD to swap, as a decimal string
    pub amount: String,
    /// The token to swap from (always "mUSD")
    pub from_currency: String,
    /// The token to receive (always "BTC")
    pub to_currency: String,
    /// The swap router address
    pub router_address: String,
}

/// Token symbol extracted from a balance or price request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct TokenQuery {
    /// The token symbol, e.g. "MUSD"
    pub token_symbol: String,
}

/// Arguments shared by every ledger tool
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct PromptArgs {
    /// the user's request in natural language, e.g. "Send 0.01 BTC to 0x..."
    pub prompt: String,
}

pub struct MezoLedger {
    gateway: Arc<dyn ChainGateway>,
    directory: TokenDirectory,
    confirmer: Arc<dyn Confirmer>,
    addresses: MezoAddresses,
    nonce_lock: tokio::sync::Mutex<()>,
    transfer_extractor: Extractor<TransferRequest>,
    swap_extractor: Extractor<SwapRequest>,
    balance_extractor: Extractor<TokenQuery>,
    price_extractor: Extractor<TokenQuery>,
}

impl MezoLedger {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        directory: TokenDirectory,
        confirmer: Arc<dyn Confirmer>,
        addresses: MezoAddresses,
    ) -> Self {
        let swap_instruction = format!(
            "- The token to swap from should always be 'mUSD'.\n\
            - The token to receive should always be 'BTC'.\n\
            - The router address should always be '{}'.",
            addresses.router
        );
        Self {
            gateway,
            directory,
            confirmer,
            addresses,
            nonce_lock: tokio::sync::Mutex::new(()),
            transfer_extractor: Extractor::new(
                None,
                Some("Extract transaction details from the request.".to_string()),
            ),
            swap_extractor: Extractor::new(None, Some(swap_instruction)),
            balance_extractor: Extractor::new(
                None,
                Some("Extract the token symbol to check the balance for.".to_string()),
            ),
            price_extractor: Extractor::new(
                None,
                Some("Extract the token symbol to check the price for.".to_string()),
            ),
        }
    }

    pub fn addresses(&self) -> &MezoAddresses {
        &self.addresses
    }

    pub fn directory(&self) -> &TokenDirectory {
        &self.directory
    }

    fn sender(&self) -> Result<Address, FlowError> {
        self.gateway
            .sender()
            .map_err(|err| FlowError::new(chain_error_kind(&err), err.to_string()))
    }

    fn chain_id(&self) -> u64 {
        self.gateway.chain_id()
    }

    /// Hands a prepared transaction to the gateway, which signs it, submits it
    /// and waits for the receipt.
    async fn sign_and_broadcast(&self, flow: &str, tx: UnsignedTx) -> Result<B256, ChainError> {
        log_stage(flow, FlowStage::Signed);
        log_stage(flow, FlowStage::Broadcast);
        self.gateway.sign_and_send(tx).await
    }
}

/// Runs an extractor, mapping any failure to an extraction error about `what`.
pub(crate) async fn extract_with<T>(
    extractor: &Extractor<T>,
    ctx: &impl CompletionFeatures,
    prompt: String,
    what: &str,
) -> Result<T, FlowError>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync,
{
    extractor
        .extract(ctx, prompt)
        .await
        .map(|(data, _)| data)
        .map_err(|err| FlowError::extraction(format!("Failed to extract {} details: {}", what, err)))
}

/// Parses the recipient of a transfer.
pub(crate) fn parse_recipient(recipient: &str) -> Result<Address, FlowError> {
    recipient
        .trim()
        .parse::<Address>()
        .map_err(|err| FlowError::validation(format!("Invalid recipient address '{}': {}", recipient, err)))
}

/// Converts a requested amount to base units.
pub(crate) fn parse_amount(amount: &str) -> Result<alloy::primitives::U256, FlowError> {
    crate::helper::to_base_units(amount)
        .map_err(|err| FlowError::validation(format!("Invalid amount '{}': {}", amount, err)))
}

#[cfg(test)]
pub(crate) mod mock;
