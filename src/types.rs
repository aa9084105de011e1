//! Request and response value objects exchanged with the IDE backend.
//!
//! Wire names are camelCase. Numeric fields coming from the backend are
//! accepted either as JSON numbers or as decimal strings.

use alloy::json_abi::JsonAbi;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SdkError;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Generate a process-unique session id: `<prefix>_<unix millis>_<suffix>`.
pub fn new_session_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), suffix)
}

/// Client configuration shared by every module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    /// Spawn a background watcher after a deployment that is still pending
    pub watch_confirmations: bool,
    pub confirmation_timeout_ms: u64,
    pub confirmation_poll_ms: u64,
    /// Upper bound on turns kept per AI session; oldest turns are evicted first
    pub max_history_turns: usize,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            watch_confirmations: true,
            confirmation_timeout_ms: 120_000,
            confirmation_poll_ms: 2_000,
            max_history_turns: 100,
        }
    }
}

impl SdkConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Partial configuration change applied by `update_config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub api_url: Option<String>,
    /// `Some(None)` clears the key
    pub api_key: Option<Option<String>>,
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileTarget {
    Solidity,
    Vyper,
    Rust,
}

impl CompileTarget {
    pub const ALL: [CompileTarget; 3] =
        [CompileTarget::Solidity, CompileTarget::Vyper, CompileTarget::Rust];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompileTarget::Solidity => "solidity",
            CompileTarget::Vyper => "vyper",
            CompileTarget::Rust => "rust",
        }
    }
}

impl fmt::Display for CompileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompileTarget {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solidity" => Ok(CompileTarget::Solidity),
            "vyper" => Ok(CompileTarget::Vyper),
            "rust" => Ok(CompileTarget::Rust),
            _ => Err(SdkError::UnsupportedTarget(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub optimization: bool,
    pub version: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization: true,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationResult {
    pub success: bool,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub target: Option<CompileTarget>,
    #[serde(default)]
    pub bytecode: Option<String>,
    #[serde(default)]
    pub abi: Option<JsonAbi>,
    /// Translated source produced by the compiler (Vyper, Solidity or Rust)
    #[serde(default, alias = "code")]
    pub compiled_code: Option<String>,
    #[serde(default, deserialize_with = "de::messages")]
    pub warnings: Vec<String>,
    #[serde(default, deserialize_with = "de::messages")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub gas_estimate: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub compilation_time_ms: Option<u64>,
}

impl CompilationResult {
    /// Enforce payload consistency: a failed compilation carries no artifacts.
    pub(crate) fn normalized(mut self, session_id: &str, target: CompileTarget) -> Self {
        if self.session_id.is_empty() {
            self.session_id = session_id.to_string();
        }
        self.target = Some(target);
        if !self.success {
            self.bytecode = None;
            self.abi = None;
            self.compiled_code = None;
            self.gas_estimate = None;
            if self.errors.is_empty() {
                self.errors.push("Compilation failed".to_string());
            }
        }
        self
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, deserialize_with = "de::messages")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "de::messages")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractExample {
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub category: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerStats {
    #[serde(deserialize_with = "de::u64_or_zero")]
    pub total_compilations: u64,
    #[serde(deserialize_with = "de::u64_or_zero")]
    pub successful_compilations: u64,
    #[serde(deserialize_with = "de::u64_or_zero")]
    pub failed_compilations: u64,
    pub by_target: HashMap<String, u64>,
    pub average_compilation_time_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Confirmed => "confirmed",
            DeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub bytecode: String,
    pub abi: JsonAbi,
    pub network: String,
    #[serde(default)]
    pub constructor_params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl DeploymentRequest {
    pub fn new(bytecode: impl Into<String>, abi: JsonAbi, network: impl Into<String>) -> Self {
        Self {
            bytecode: bytecode.into(),
            abi,
            network: network.into(),
            constructor_params: Vec::new(),
            gas_limit: None,
            gas_price: None,
            value: None,
        }
    }
}

/// Raw `POST /deploy/contract` answer before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct DeployResponse {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub contract_address: Option<String>,
    #[serde(deserialize_with = "de::opt_u64")]
    pub block_number: Option<u64>,
    #[serde(deserialize_with = "de::opt_u64")]
    pub gas_used: Option<u64>,
    pub status: Option<DeploymentStatus>,
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub success: bool,
    pub session_id: String,
    pub transaction_hash: Option<String>,
    pub contract_address: Option<String>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub status: DeploymentStatus,
    pub error: Option<String>,
}

impl DeploymentResult {
    /// Map a backend answer into a result whose `success` flag always agrees
    /// with its payload: success requires both a contract address and a
    /// transaction hash, failure carries neither.
    pub(crate) fn from_response(session_id: &str, response: DeployResponse) -> Self {
        let non_empty = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());
        let complete = non_empty(&response.contract_address) && non_empty(&response.transaction_hash);

        if response.success && complete && response.status != Some(DeploymentStatus::Failed) {
            let status = response.status.unwrap_or(if response.block_number.is_some() {
                DeploymentStatus::Confirmed
            } else {
                DeploymentStatus::Pending
            });
            return Self {
                success: true,
                session_id: session_id.to_string(),
                transaction_hash: response.transaction_hash,
                contract_address: response.contract_address,
                block_number: response.block_number,
                gas_used: response.gas_used,
                status,
                error: None,
            };
        }

        let error = response
            .error
            .or(response.message)
            .unwrap_or_else(|| {
                if response.success {
                    "Deployment response is missing the contract address or transaction hash"
                        .to_string()
                } else {
                    "Deployment failed".to_string()
                }
            });

        Self::failed(session_id, error)
    }

    pub(crate) fn failed(session_id: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: session_id.to_string(),
            transaction_hash: None,
            contract_address: None,
            block_number: None,
            gas_used: None,
            status: DeploymentStatus::Failed,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(deserialize_with = "de::u64_or_zero")]
    pub gas_estimate: u64,
    #[serde(deserialize_with = "de::opt_string")]
    pub gas_price: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub estimated_cost: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub contract_address: String,
    pub network: String,
    pub source_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor_args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerificationResult {
    pub success: bool,
    pub message: Option<String>,
    pub guid: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub session_id: String,
    pub network: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub transaction_hash: Option<String>,
    pub contract_address: Option<String>,
    #[serde(deserialize_with = "de::opt_u64")]
    pub block_number: Option<u64>,
    pub error: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub network: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkInfo {
    pub name: String,
    #[serde(deserialize_with = "de::opt_u64")]
    pub chain_id: Option<u64>,
    #[serde(deserialize_with = "de::opt_u64")]
    pub block_number: Option<u64>,
    #[serde(deserialize_with = "de::opt_string")]
    pub gas_price: Option<String>,
    pub explorer_url: Option<String>,
}

/// Which strategy of a backend-then-chain lookup produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupSource {
    Backend,
    Chain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrice {
    /// Wei, decimal string
    pub gas_price: String,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    pub source: LookupSource,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct GasPriceResponse {
    #[serde(deserialize_with = "de::opt_string")]
    pub gas_price: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub max_fee_per_gas: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub max_priority_fee_per_gas: Option<String>,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerificationStatus {
    pub verified: bool,
    pub contract_name: Option<String>,
    pub compiler_version: Option<String>,
    pub explorer_url: Option<String>,
    pub verified_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractSource {
    pub source_code: Option<String>,
    pub contract_name: Option<String>,
    pub compiler_version: Option<String>,
    pub abi: Option<JsonAbi>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractTransaction {
    #[serde(alias = "transactionHash")]
    pub hash: String,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub value: Option<String>,
    pub method: Option<String>,
    #[serde(deserialize_with = "de::opt_u64")]
    pub block_number: Option<u64>,
    pub timestamp: Option<String>,
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSession {
    pub session_id: String,
    pub conversation_history: Vec<ChatTurn>,
    pub code_context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub session_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiResponse {
    pub success: bool,
    pub response: Option<String>,
    /// Status text; some endpoints put the whole answer here instead of `response`
    pub message: Option<String>,
    pub code: Option<String>,
    pub suggestions: Vec<String>,
    pub session_id: Option<String>,
    pub error: Option<String>,
    /// Endpoint-specific fields (review findings, optimization notes, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AiResponse {
    /// The assistant's answer: `response`, falling back to `message`.
    pub fn text(&self) -> Option<&str> {
        self.response.as_deref().or(self.message.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiStatus {
    pub available: bool,
    pub model: Option<String>,
    pub message: Option<String>,
}

/// Lenient deserializers for backend payloads.
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn value_to_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
            Value::String(s) => {
                let s = s.trim();
                match s.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => s.parse().ok(),
                }
            }
            _ => None,
        }
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(value_to_u64))
    }

    pub fn u64_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(opt_u64(deserializer)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Diagnostics arrive either as plain strings or as `{message, ...}` objects.
    pub fn messages<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        let items = match value {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(other) => vec![other],
        };
        Ok(items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                Value::Object(ref obj) => obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| item.to_string()),
                other => other.to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_format() {
        let a = new_session_id("deploy");
        let b = new_session_id("deploy");
        assert!(a.starts_with("deploy_"));
        assert_eq!(a.split('_').count(), 3);
        assert_eq!(a.rsplit('_').next().unwrap().len(), 9);
        assert_ne!(a, b);
    }

    #[test]
    fn test_compile_target_parsing() {
        assert_eq!("Solidity".parse::<CompileTarget>().unwrap(), CompileTarget::Solidity);
        assert_eq!(" vyper ".parse::<CompileTarget>().unwrap(), CompileTarget::Vyper);
        assert_eq!("rust".parse::<CompileTarget>().unwrap(), CompileTarget::Rust);
        for bad in ["python", "cairo", "", "move"] {
            assert!(matches!(
                bad.parse::<CompileTarget>(),
                Err(SdkError::UnsupportedTarget(_))
            ));
        }
    }

    #[test]
    fn test_failed_compilation_drops_artifacts() {
        let result: CompilationResult = serde_json::from_value(json!({
            "success": false,
            "bytecode": "0x6000",
            "abi": [],
            "errors": [{"message": "line 3: unexpected indent"}]
        }))
        .unwrap();
        let result = result.normalized("compile_1_abc", CompileTarget::Vyper);

        assert!(!result.success);
        assert!(result.bytecode.is_none());
        assert!(result.abi.is_none());
        assert_eq!(result.first_error(), Some("line 3: unexpected indent"));
        assert_eq!(result.session_id, "compile_1_abc");
    }

    #[test]
    fn test_deployment_result_consistency() {
        let fixtures = vec![
            json!({"success": true, "contractAddress": "0xabc", "transactionHash": "0x123"}),
            json!({"success": true, "contractAddress": "0xabc", "transactionHash": "0x123", "blockNumber": 12}),
            json!({"success": true, "contractAddress": "", "transactionHash": "0x123"}),
            json!({"success": true, "transactionHash": "0x123"}),
            json!({"success": true, "contractAddress": "0xabc", "transactionHash": "0x123", "status": "failed"}),
            json!({"success": false, "contractAddress": "0xabc", "transactionHash": "0x123"}),
            json!({"success": false, "error": "insufficient funds"}),
            json!({}),
        ];

        for fixture in fixtures {
            let response: DeployResponse = serde_json::from_value(fixture.clone()).unwrap();
            let result = DeploymentResult::from_response("deploy_1_x", response);
            if result.success {
                assert!(!result.contract_address.as_deref().unwrap_or("").is_empty(), "{}", fixture);
                assert!(!result.transaction_hash.as_deref().unwrap_or("").is_empty(), "{}", fixture);
                assert_ne!(result.status, DeploymentStatus::Failed);
            } else {
                assert!(result.contract_address.is_none(), "{}", fixture);
                assert!(result.transaction_hash.is_none(), "{}", fixture);
                assert_eq!(result.status, DeploymentStatus::Failed);
                assert!(result.error.is_some());
            }
        }
    }

    #[test]
    fn test_deployment_status_derivation() {
        let pending: DeployResponse = serde_json::from_value(
            json!({"success": true, "contractAddress": "0xabc", "transactionHash": "0x1"}),
        )
        .unwrap();
        assert_eq!(
            DeploymentResult::from_response("s", pending).status,
            DeploymentStatus::Pending
        );

        let mined: DeployResponse = serde_json::from_value(json!({
            "success": true, "contractAddress": "0xabc", "transactionHash": "0x1",
            "blockNumber": "0x10", "gasUsed": "21000"
        }))
        .unwrap();
        let result = DeploymentResult::from_response("s", mined);
        assert_eq!(result.status, DeploymentStatus::Confirmed);
        assert_eq!(result.block_number, Some(16));
        assert_eq!(result.gas_used, Some(21000));
    }

    #[test]
    fn test_ai_response_keeps_extra_fields() {
        let response: AiResponse = serde_json::from_value(json!({
            "success": true,
            "message": "Looks good",
            "review": {"score": 8}
        }))
        .unwrap();
        assert_eq!(response.text(), Some("Looks good"));
        assert_eq!(response.extra["review"]["score"], 8);
    }

    #[test]
    fn test_ai_response_with_response_and_message() {
        let response: AiResponse = serde_json::from_value(json!({
            "success": true,
            "response": "Use a mapping.",
            "message": "Chat completed"
        }))
        .unwrap();
        assert_eq!(response.text(), Some("Use a mapping."));
        assert_eq!(response.message.as_deref(), Some("Chat completed"));
        assert!(response.extra.is_empty());
    }
}
