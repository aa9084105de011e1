use alloy::{
    primitives::{Address, TxHash, U256},
    signers::local::PrivateKeySigner,
};
use std::str::FromStr;

use crate::error::{Result, SdkError};

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(SdkError::InvalidInput("Address cannot be empty".to_string()));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(SdkError::InvalidInput(format!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        )));
    }

    if address.len() != 42 {
        return Err(SdkError::InvalidInput(format!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        )));
    }

    if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SdkError::InvalidInput(format!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        )));
    }

    Address::from_str(address)
        .map_err(|e| SdkError::InvalidInput(format!("Invalid Ethereum address '{}': {}", address, e)))
}

pub fn validate_tx_hash(hash: &str) -> Result<TxHash> {
    let hash = hash.trim();
    if hash.len() != 66 || !(hash.starts_with("0x") || hash.starts_with("0X")) {
        return Err(SdkError::InvalidInput(format!(
            "Invalid transaction hash '{}'. Expected 0x followed by 64 hex characters",
            hash
        )));
    }
    TxHash::from_str(hash)
        .map_err(|e| SdkError::InvalidInput(format!("Invalid transaction hash '{}': {}", hash, e)))
}

/// Parses a wei amount given either as a decimal string or as `0x` hex
pub fn validate_hex_value(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Err(SdkError::InvalidInput("Value cannot be empty".to_string()));
    }

    if let Some(hex) = value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        U256::from_str_radix(hex, 16)
            .map_err(|_| SdkError::InvalidInput(format!("Invalid hexadecimal value: '{}'", value_str)))
    } else {
        U256::from_str_radix(value_str, 10).map_err(|_| {
            SdkError::InvalidInput(format!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            ))
        })
    }
}

/// Gas price in wei; must fit in a u128.
pub fn parse_gas_price(value_str: &str) -> Result<u128> {
    let value = validate_hex_value(value_str)?;
    u128::try_from(value).map_err(|_| {
        SdkError::InvalidInput(format!("Gas price '{}' is out of range", value_str.trim()))
    })
}

pub fn parse_private_key(private_key: &str) -> Result<PrivateKeySigner> {
    let key = private_key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    PrivateKeySigner::from_str(key)
        .map_err(|_| SdkError::InvalidInput("Invalid private key".to_string()))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        format!("Execution reverted: the contract rejected the call. {}", error)
    } else if error.contains("insufficient funds") {
        "Insufficient funds to cover value and gas costs".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Gas limit too low for this transaction".to_string()
    } else if error.contains("nonce too low") {
        "Nonce too low: another transaction with this nonce was already mined".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Gas price too low to replace the pending transaction".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Cannot connect to RPC endpoint. Check the network's RPC URL".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "RPC request timed out".to_string()
    } else if error.contains("rate limit") || error.contains("429") {
        "RPC endpoint rate limit reached".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
