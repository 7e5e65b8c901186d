//! Configuration for the gateway server.
//!
//! Values come from a JSON file named by `--config` (env `CONFIG`, default
//! `config.json`), with serde defaults falling back to environment
//! variables and then to hardcoded defaults. Secret-bearing fields accept
//! `$VAR` / `${VAR}` references resolved at load time so keys stay out of
//! the file.

use clap::Parser;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// CLI arguments for the gateway server.
#[derive(Parser, Debug)]
#[command(name = "x402-gateway")]
#[command(about = "Payment-gated agent API server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// A transparent wrapper that resolves environment variables during
/// deserialization.
///
/// Accepts literal values, `$VAR`, or `${VAR}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
            Some(braced)
        } else if let Some(name) = s.strip_prefix('$') {
            (!name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_'))
                .then_some(name)
        } else {
            None
        }
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))?;
        Ok(LiteralOrEnv(parsed))
    }
}

/// Downstream completions backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "config_defaults::default_upstream_url")]
    pub base_url: Url,
    #[serde(default = "config_defaults::default_api_key")]
    pub api_key: LiteralOrEnv<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: config_defaults::default_upstream_url(),
            api_key: config_defaults::default_api_key(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    /// Address payment proofs must name as recipient.
    #[serde(default = "config_defaults::default_receiving_address")]
    receiving_address: LiteralOrEnv<String>,
    #[serde(default = "config_defaults::default_network")]
    network: String,
    #[serde(default = "config_defaults::default_asset_contract")]
    asset_contract: String,
    /// Maximum age of a proof's timestamp, in seconds.
    #[serde(default = "config_defaults::default_validity_window_secs")]
    validity_window_secs: u64,
    /// Hard deadline for one handler dispatch, in seconds.
    #[serde(default = "config_defaults::default_handler_timeout_secs")]
    handler_timeout_secs: u64,
    #[serde(default = "config_defaults::default_ledger_path")]
    ledger_path: PathBuf,
    #[serde(default)]
    upstream: UpstreamConfig,
}

pub mod config_defaults {
    use super::LiteralOrEnv;
    use std::env;
    use std::net::IpAddr;
    use std::path::PathBuf;
    use url::Url;

    pub const DEFAULT_PORT: u16 = 5002;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_VALIDITY_WINDOW_SECS: u64 = 300;
    pub const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 30;
    /// USDC on Base.
    pub const DEFAULT_ASSET_CONTRACT: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

    /// Returns the default port value with fallback: $PORT env var -> 5002
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_receiving_address() -> LiteralOrEnv<String> {
        let address = env::var("RECEIVING_ADDRESS")
            .unwrap_or_else(|_| "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0".to_string());
        LiteralOrEnv::from_literal(address)
    }

    pub fn default_network() -> String {
        "base".to_string()
    }

    pub fn default_asset_contract() -> String {
        DEFAULT_ASSET_CONTRACT.to_string()
    }

    pub fn default_validity_window_secs() -> u64 {
        DEFAULT_VALIDITY_WINDOW_SECS
    }

    pub fn default_handler_timeout_secs() -> u64 {
        DEFAULT_HANDLER_TIMEOUT_SECS
    }

    pub fn default_ledger_path() -> PathBuf {
        PathBuf::from("data/payments.jsonl")
    }

    pub fn default_upstream_url() -> Url {
        Url::parse("https://coding.dashscope.aliyuncs.com/v1/").unwrap()
    }

    pub fn default_api_key() -> LiteralOrEnv<String> {
        LiteralOrEnv::from_literal(env::var("API_KEY").unwrap_or_default())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            receiving_address: config_defaults::default_receiving_address(),
            network: config_defaults::default_network(),
            asset_contract: config_defaults::default_asset_contract(),
            validity_window_secs: config_defaults::default_validity_window_secs(),
            handler_timeout_secs: config_defaults::default_handler_timeout_secs(),
            ledger_path: config_defaults::default_ledger_path(),
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn receiving_address(&self) -> &str {
        self.receiving_address.inner()
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn asset_contract(&self) -> &str {
        &self.asset_contract
    }

    pub fn validity_window(&self) -> Duration {
        Duration::from_secs(self.validity_window_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn ledger_path(&self) -> &PathBuf {
        &self.ledger_path
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    /// Load configuration from CLI arguments and the JSON file.
    ///
    /// A missing file at the default path falls back to built-in defaults;
    /// an explicitly configured path that does not exist is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        if !cli_args.config.exists() && cli_args.config == PathBuf::from("config.json") {
            tracing::warn!("No config.json found, using built-in defaults");
            return Ok(Config::default());
        }
        Self::load_from_path(cli_args.config)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
