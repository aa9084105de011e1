pub mod abi;
pub mod contract;
pub mod networks;
pub mod provider;
pub mod utils;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::LookupSource;

/// Decoded contract log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub name: String,
    pub signature: String,
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    /// Parameter name to decoded value
    pub args: Value,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub status: bool,
    pub contract_address: Option<String>,
    pub confirmations: u64,
}

/// Transaction overrides for `send` and `estimate_gas`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TxOptions {
    /// Wei, decimal or 0x hex
    pub value: Option<String>,
    pub gas_limit: Option<u64>,
    /// Wei, decimal or 0x hex
    pub gas_price: Option<String>,
    /// Sender used for estimation when no signer is bound
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub transaction_hash: String,
    pub from: String,
    pub to: String,
    pub method: String,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: String,
    pub status: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractInfo {
    pub address: String,
    pub network: String,
    pub name: Option<String>,
    /// Wei, decimal string
    pub balance: Option<String>,
    pub is_contract: bool,
    pub bytecode_size: usize,
    #[serde(deserialize_with = "crate::types::de::opt_u64")]
    pub transaction_count: Option<u64>,
    pub verified: Option<bool>,
    #[serde(skip_deserializing)]
    pub source: Option<LookupSource>,
}
