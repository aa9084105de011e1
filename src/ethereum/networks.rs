use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SdkError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
    pub native_currency: NativeCurrency,
}

const BUILTIN: &[(&str, u64, &str, Option<&str>, &str, &str)] = &[
    (
        "ethereum",
        1,
        "https://eth-mainnet.g.alchemy.com/v2/demo",
        Some("https://etherscan.io"),
        "Ether",
        "ETH",
    ),
    (
        "sepolia",
        11155111,
        "https://eth-sepolia.g.alchemy.com/v2/demo",
        Some("https://sepolia.etherscan.io"),
        "Sepolia Ether",
        "ETH",
    ),
    (
        "polygon",
        137,
        "https://polygon-rpc.com",
        Some("https://polygonscan.com"),
        "POL",
        "POL",
    ),
    (
        "polygon-amoy",
        80002,
        "https://rpc-amoy.polygon.technology",
        Some("https://amoy.polygonscan.com"),
        "POL",
        "POL",
    ),
    (
        "arbitrum",
        42161,
        "https://arb1.arbitrum.io/rpc",
        Some("https://arbiscan.io"),
        "Ether",
        "ETH",
    ),
    (
        "optimism",
        10,
        "https://mainnet.optimism.io",
        Some("https://optimistic.etherscan.io"),
        "Ether",
        "ETH",
    ),
    (
        "base",
        8453,
        "https://mainnet.base.org",
        Some("https://basescan.org"),
        "Ether",
        "ETH",
    ),
    ("localhost", 31337, "http://127.0.0.1:8545", None, "Ether", "ETH"),
];

/// Network name to descriptor table.
///
/// Built once from the built-in networks plus configured RPC overrides, then
/// shared read-only by every client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Networks {
    table: BTreeMap<String, NetworkDescriptor>,
}

impl Default for Networks {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Networks {
    pub fn builtin() -> Self {
        let table = BUILTIN
            .iter()
            .map(|(name, chain_id, rpc_url, explorer_url, currency, symbol)| {
                (
                    name.to_string(),
                    NetworkDescriptor {
                        name: name.to_string(),
                        chain_id: *chain_id,
                        rpc_url: rpc_url.to_string(),
                        explorer_url: explorer_url.map(str::to_string),
                        native_currency: NativeCurrency {
                            name: currency.to_string(),
                            symbol: symbol.to_string(),
                            decimals: 18,
                        },
                    },
                )
            })
            .collect();
        Self { table }
    }

    /// Replace the RPC endpoint of a known network, or register a new one.
    pub fn with_rpc_override(mut self, name: &str, rpc_url: &str, chain_id: Option<u64>) -> Self {
        match self.table.get_mut(name) {
            Some(descriptor) => {
                descriptor.rpc_url = rpc_url.to_string();
                if let Some(chain_id) = chain_id {
                    descriptor.chain_id = chain_id;
                }
            }
            None => {
                self.table.insert(
                    name.to_string(),
                    NetworkDescriptor {
                        name: name.to_string(),
                        chain_id: chain_id.unwrap_or_default(),
                        rpc_url: rpc_url.to_string(),
                        explorer_url: None,
                        native_currency: NativeCurrency {
                            name: "Ether".to_string(),
                            symbol: "ETH".to_string(),
                            decimals: 18,
                        },
                    },
                );
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&NetworkDescriptor> {
        self.table.get(name)
    }

    /// Look up `name`, failing with `NetworkUnsupported` for unknown names.
    pub fn require(&self, name: &str) -> Result<&NetworkDescriptor> {
        self.table
            .get(name)
            .ok_or_else(|| SdkError::NetworkUnsupported(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    pub fn explorer_tx_url(&self, network: &str, tx_hash: &str) -> Option<String> {
        self.get(network)?
            .explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, tx_hash))
    }
}
