//! Token directory backed by the exchange subgraph.
//!
//! Symbols are resolved to contract addresses on every call; nothing is cached.

use alloy::primitives::Address;
use mezo_core::{BoxError, BoxPinFut, HttpRPCError, Json, http_json_post};
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};

use crate::MEZO_GRAPH_URL;

static TOKENS_QUERY: &str = "{ tokens(first: 100) { id symbol } }";

/// Index symbol of wrapped BTC, which users call "btc"
pub static WRAPPED_BTC_SYMBOL: &str = "wtbtc";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Token '{symbol}' not found. Available: {}", .available.join(", "))]
    NotFound {
        symbol: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    Transport(String),

    #[error("invalid token address {id:?}: {error}")]
    InvalidAddress { id: String, error: String },

    #[error("Price data for token {0} not found.")]
    PriceNotFound(String),

    #[error("unexpected index response: {0}")]
    Malformed(String),
}

/// Transport for GraphQL queries against the index.
pub trait GraphQuery: Send + Sync + 'static {
    /// Runs the query and returns the `data` member of the response
    fn query(&self, query: String) -> BoxPinFut<Result<Json, DirectoryError>>;
}

/// GraphQL over HTTP POST.
#[derive(Clone)]
pub struct GraphClient {
    endpoint: String,
    http: reqwest::Client,
}

impl GraphClient {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, BoxError> {
        Ok(Self {
            endpoint: endpoint
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| MEZO_GRAPH_URL.to_string()),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

impl GraphQuery for GraphClient {
    fn query(&self, query: String) -> BoxPinFut<Result<Json, DirectoryError>> {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let res: Json = http_json_post(&http, &endpoint, &json!({ "query": query }))
                .await
                .map_err(|err| match err {
                    HttpRPCError::ResponseError { status, .. } => DirectoryError::Transport(
                        format!("GraphQL query failed with status code {}", status),
                    ),
                    err => DirectoryError::Transport(err.to_string()),
                })?;
            if let Some(errors) = res.get("errors") {
                return Err(DirectoryError::Transport(format!("GraphQL errors: {}", errors)));
            }
            Ok(res.get("data").cloned().unwrap_or(Json::Null))
        })
    }
}

/// A token listed by the index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenRecord {
    pub id: String,
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
struct TokensData {
    tokens: Vec<TokenRecord>,
}

/// Derived prices of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPrice {
    /// Upper-cased index symbol
    pub symbol: String,
    pub derived_usd: String,
    pub derived_eth: String,
}

impl std::fmt::Display for TokenPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Price of {}: {} USD, {} ETH.",
            self.symbol, self.derived_usd, self.derived_eth
        )
    }
}

/// Maps a user symbol to the index symbol: lower-cased, with `btc` aliased to wrapped BTC.
pub fn normalize_symbol(symbol: &str) -> String {
    let symbol = symbol.trim().to_lowercase();
    if symbol == "btc" {
        WRAPPED_BTC_SYMBOL.to_string()
    } else {
        symbol
    }
}

fn price_field(token: &Json, key: &str) -> String {
    match token.get(key) {
        None | Some(Json::Null) => "N/A".to_string(),
        Some(Json::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

#[derive(Clone)]
pub struct TokenDirectory {
    graph: Arc<dyn GraphQuery>,
}

impl TokenDirectory {
    pub fn new(graph: Arc<dyn GraphQuery>) -> Self {
        Self { graph }
    }

    /// Lists the first 100 tokens of the index.
    pub async fn tokens(&self) -> Result<Vec<TokenRecord>, DirectoryError> {
        let data = self.graph.query(TOKENS_QUERY.to_string()).await?;
        let data: TokensData =
            serde_json::from_value(data).map_err(|err| DirectoryError::Malformed(err.to_string()))?;
        Ok(data.tokens)
    }

    /// Resolves a symbol to its contract address.
    pub async fn resolve(&self, symbol: &str) -> Result<Address, DirectoryError> {
        // errors show the symbol as typed, after the btc alias
        let typed = match symbol.trim() {
            s if s.eq_ignore_ascii_case("btc") => WRAPPED_BTC_SYMBOL,
            s => s,
        };
        let symbol = normalize_symbol(symbol);
        let tokens = self.tokens().await?;
        match tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(&symbol)) {
            Some(token) => {
                let address = token.id.parse::<Address>().map_err(|err| {
                    DirectoryError::InvalidAddress {
                        id: token.id.clone(),
                        error: format!("{err}"),
                    }
                })?;
                log::info!(symbol = symbol, address = address.to_checksum(None); "token resolved");
                Ok(address)
            }
            None => Err(DirectoryError::NotFound {
                symbol: typed.to_string(),
                available: tokens.into_iter().map(|t| t.symbol).collect(),
            }),
        }
    }

    /// Reads the derived USD and ETH prices of a token.
    pub async fn price(&self, symbol: &str) -> Result<TokenPrice, DirectoryError> {
        let display = normalize_symbol(symbol).to_uppercase();
        let address = self.resolve(symbol).await?;
        let query = format!(
            "{{ token(id: \"{}\") {{ id decimals derivedUSD derivedETH }} }}",
            address.to_string().to_lowercase()
        );
        let data = self.graph.query(query).await?;
        match data.get("token") {
            None | Some(Json::Null) => Err(DirectoryError::PriceNotFound(display)),
            Some(token) => Ok(TokenPrice {
                symbol: display,
                derived_usd: price_field(token, "derivedUSD"),
                derived_eth: price_field(token, "derivedETH"),
            }),
        }
    }
}
