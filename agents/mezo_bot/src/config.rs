use alloy::primitives::Address;
use config::{Config, Environment, File, FileFormat};
use mezo_core::BoxError;
use mezo_engine::model::openai;
use mezo_evm::{
    GatewayConfig, MEZO_CHAIN_ID, MEZO_GRAPH_URL, MEZO_RPC_URL, MUSD_ADDRESS, MezoAddresses,
    ROUTER_ADDRESS, WRAPPED_BTC_ADDRESS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Log {
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The API key is read from `OPENAI_API_KEY` when not set here.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Llm {
    #[serde(skip_serializing)]
    pub api_key: String,
    /// OpenAI compatible endpoint, empty for api.openai.com
    pub endpoint: String,
    pub model: String,
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            model: openai::GPT_4O_MINI.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Chain {
    pub rpc_url: String,
    pub chain_id: u64,
    pub request_timeout_secs: u64,
    pub receipt_timeout_secs: u64,
    pub musd_address: Address,
    pub wrapped_btc_address: Address,
    pub router_address: Address,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            rpc_url: MEZO_RPC_URL.to_string(),
            chain_id: MEZO_CHAIN_ID,
            request_timeout_secs: 20,
            receipt_timeout_secs: 120,
            musd_address: MUSD_ADDRESS,
            wrapped_btc_address: WRAPPED_BTC_ADDRESS,
            router_address: ROUTER_ADDRESS,
        }
    }
}

impl Chain {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
        }
    }

    pub fn addresses(&self) -> MezoAddresses {
        MezoAddresses {
            musd: self.musd_address,
            wrapped_btc: self.wrapped_btc_address,
            router: self.router_address,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Graph {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            url: MEZO_GRAPH_URL.to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Twitter {
    /// JSON file holding the registered characters' credentials
    pub config_path: String,
}

impl Default for Twitter {
    fn default() -> Self {
        Self {
            config_path: "twitter_config.json".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Conf {
    pub log: Log,
    pub llm: Llm,
    pub chain: Chain,
    pub graph: Graph,
    pub twitter: Twitter,
}

impl Conf {
    /// Reads the TOML file, when present, then `MEZO__SECTION__KEY` environment overrides.
    pub fn from_file(file_name: &str) -> Result<Self, BoxError> {
        let builder = Config::builder()
            .add_source(File::new(file_name, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("MEZO").separator("__"));
        let mut cfg = builder.build()?.try_deserialize::<Conf>()?;
        if cfg.llm.api_key.is_empty() {
            cfg.llm.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> Result<Self, BoxError> {
        let cfg: Self = toml::from_str(content)?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, BoxError> {
        let content = toml::to_string(&self)?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_conf() {
        let cfg = Conf::from_toml(
            r#"
            [llm]
            model = "gpt-4o"

            [chain]
            receipt_timeout_secs = 30
            router_address = "0x0000000000000000000000000000000000000001"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.chain.chain_id, 31611);
        assert_eq!(cfg.chain.rpc_url, MEZO_RPC_URL);
        assert_eq!(
            cfg.chain.gateway_config().receipt_timeout,
            Duration::from_secs(30)
        );
        let addresses = cfg.chain.addresses();
        assert_eq!(addresses.musd, MUSD_ADDRESS);
        assert_eq!(addresses.router, Address::with_last_byte(1));
        assert_eq!(cfg.twitter.config_path, "twitter_config.json");

        let content = cfg.to_toml().unwrap();
        assert!(!content.contains("api_key"));
        let cfg2 = Conf::from_toml(&content).unwrap();
        assert_eq!(cfg2.chain.addresses(), addresses);
    }

    #[test]
    fn test_conf_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[graph]\ntimeout_secs = 5\n[llm]\napi_key = \"sk-test\"").unwrap();
        let cfg = Conf::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.graph.timeout_secs, 5);
        assert_eq!(cfg.graph.url, MEZO_GRAPH_URL);
        assert_eq!(cfg.llm.api_key, "sk-test");

        let cfg = Conf::from_file("./no-such-config.toml").unwrap();
        assert_eq!(cfg.chain.chain_id, MEZO_CHAIN_ID);
    }
}
