use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

use crate::ethereum::networks::Networks;
use crate::types::SdkConfig;

const ALCHEMY_DEMO: &str = "alchemy.com/v2/demo";
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sdk: SdkConfig,
    pub default_network: String,
    /// RPC overrides and extra networks, keyed by network name
    pub networks: HashMap<String, NetworkOverride>,
    pub security: SecurityConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkOverride {
    pub rpc_url: String,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub allow_write_operations: bool,
    /// Largest `value` a write tool may send, in wei
    pub max_transaction_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sdk: SdkConfig::default(),
            default_network: "sepolia".to_string(),
            networks: HashMap::new(),
            security: SecurityConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_write_operations: false,
            max_transaction_value: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_url) = std::env::var("CONTRACT_IDE_API_URL") {
            tracing::info!("Using CONTRACT_IDE_API_URL for the backend");
            self.sdk.api_url = api_url;
        }
        if let Ok(api_key) = std::env::var("CONTRACT_IDE_API_KEY") {
            self.sdk.api_key = Some(api_key);
        }

        let alchemy_key = std::env::var("ALCHEMY_API_KEY").ok();
        self.apply_alchemy_key(alchemy_key.as_deref());
    }

    /// Swap Alchemy demo endpoints, built-in or configured, for keyed ones.
    fn apply_alchemy_key(&mut self, api_key: Option<&str>) {
        let Some(api_key) = api_key else {
            let networks = self.network_table();
            for name in networks.names() {
                if networks.get(&name).map_or(false, |n| n.rpc_url.contains("/demo")) {
                    tracing::warn!(
                        "Using demo RPC endpoint for {}, set ALCHEMY_API_KEY for better reliability",
                        name
                    );
                }
            }
            return;
        };

        tracing::info!("Using ALCHEMY_API_KEY environment variable for RPC URLs");
        let builtin = Networks::builtin();
        for name in builtin.names() {
            if self.networks.contains_key(&name) {
                continue;
            }
            if let Some(descriptor) = builtin.get(&name) {
                if descriptor.rpc_url.contains(ALCHEMY_DEMO) {
                    self.networks.insert(
                        name.clone(),
                        NetworkOverride {
                            rpc_url: descriptor.rpc_url.replace("/demo", &format!("/{}", api_key)),
                            chain_id: None,
                        },
                    );
                }
            }
        }

        for (name, network) in self.networks.iter_mut() {
            if network.rpc_url.contains(ALCHEMY_DEMO) {
                network.rpc_url = network.rpc_url.replace("/demo", &format!("/{}", api_key));
                tracing::debug!("Updated {} RPC URL with API key", name);
            } else if network.rpc_url.contains(API_KEY_PLACEHOLDER) {
                network.rpc_url = network.rpc_url.replace(API_KEY_PLACEHOLDER, api_key);
                tracing::debug!("Updated {} RPC URL with API key", name);
            }
        }
    }

    /// Built-in networks with the configured overrides applied.
    pub fn network_table(&self) -> Networks {
        self.networks
            .iter()
            .fold(Networks::builtin(), |networks, (name, network)| {
                networks.with_rpc_override(name, &network.rpc_url, network.chain_id)
            })
    }

    /// Check settings that would otherwise only fail on first use.
    pub fn validate(&self) -> Result<()> {
        let networks = self.network_table();
        if networks.get(&self.default_network).is_none() {
            return Err(anyhow!(
                "Default network '{}' is not configured. Known networks: {}",
                self.default_network,
                networks.names().join(", ")
            ));
        }
        if self.server.transport != "stdio" {
            return Err(anyhow!(
                "Unsupported server transport '{}'. Only 'stdio' is available",
                self.server.transport
            ));
        }
        if self.sdk.api_url.trim().is_empty() {
            return Err(anyhow!("sdk.api_url cannot be empty"));
        }
        if let Some(max) = &self.security.max_transaction_value {
            crate::ethereum::utils::validate_hex_value(max)
                .map_err(|e| anyhow!("security.max_transaction_value: {}", e))?;
        }
        Ok(())
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-ide").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Contract IDE configuration file

# Network used by tools when none is given
default_network = "sepolia"

# IDE backend
[sdk]
api_url = "http://localhost:3001/api"
# api_key = "..."
timeout_ms = 30000
watch_confirmations = true
confirmation_timeout_ms = 120000
confirmation_poll_ms = 2000
max_history_turns = 100

# RPC overrides. Built-in networks: ethereum, sepolia, polygon, polygon-amoy,
# arbitrum, optimism, base, localhost. Unknown names register a new network.
[networks.sepolia]
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"

[networks.anvil]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

# Security settings
[security]
allow_write_operations = false
# max_transaction_value = "1000000000000000000"  # 1 ETH in wei

# Server configuration
[server]
transport = "stdio"  # the only supported transport

# Environment variables that can be used:
# CONTRACT_IDE_API_URL - overrides sdk.api_url
# CONTRACT_IDE_API_KEY - overrides sdk.api_key
# ALCHEMY_API_KEY - Your Alchemy API key (replaces demo endpoints and YOUR_API_KEY_HERE)
"#;
        sample_config.to_string()
    }
}
