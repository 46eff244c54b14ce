//! Agent tools for the Mezo chain.
//!
//! - [`gateway`]: JSON-RPC access to the chain and transaction signing
//! - [`directory`]: token symbol resolution and prices from the exchange subgraph
//! - [`ledger`]: the transaction flows and the [`mezo_core::Tool`] wrappers exposing them

use alloy::primitives::{Address, address};

pub mod directory;
pub mod erc20;
pub mod gateway;
pub mod helper;
pub mod ledger;

pub use directory::*;
pub use gateway::*;
pub use ledger::*;

/// Mezo testnet (Matsnet) chain id
pub const MEZO_CHAIN_ID: u64 = 31611;

/// Mezo testnet JSON-RPC endpoint
pub static MEZO_RPC_URL: &str = "https://rpc.test.mezo.org";

/// Exchange subgraph indexing Mezo testnet tokens
pub static MEZO_GRAPH_URL: &str = "https://api.goldsky.com/api/public/project_cm48lsrzo0axx01tna6rb1ee9/subgraphs/exchange-v2-mezo/1.0.0/gn";

/// mUSD token contract
pub const MUSD_ADDRESS: Address = address!("0x637e22A1EBbca50EA2d34027c238317fD10003eB");

/// Wrapped BTC token contract
pub const WRAPPED_BTC_ADDRESS: Address = address!("0xA460F83cdd9584E4bD6a9838abb0baC58EAde999");

/// Swap router contract
pub const ROUTER_ADDRESS: Address = address!("0xC2E61936a542D78b9c3AA024fA141c4C632DF6c1");
