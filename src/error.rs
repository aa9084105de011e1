//! SDK error types

use thiserror::Error;

/// Errors raised by every client in the SDK.
///
/// Local precondition failures (`NetworkUnsupported`, `UnsupportedTarget`,
/// `MethodNotFound`, `SignerRequired`, `SessionNotFound`, `InvalidInput`) are
/// raised before any request leaves the process.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The backend rejected the request body
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Client-side timeout, in milliseconds
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Network '{0}' is not supported")]
    NetworkUnsupported(String),

    #[error("Compiler target '{0}' is not supported. Expected one of: solidity, vyper, rust")]
    UnsupportedTarget(String),

    #[error("Method '{0}' not found in contract ABI")]
    MethodNotFound(String),

    #[error("Event '{0}' not found in contract ABI")]
    EventNotFound(String),

    #[error("A signer is required to send transactions")]
    SignerRequired,

    #[error("AI session '{0}' not found")]
    SessionNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON-RPC provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

impl SdkError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SdkError::Validation { .. } => "ValidationError",
            SdkError::Unauthorized(_) => "Unauthorized",
            SdkError::RateLimited(_) => "RateLimited",
            SdkError::Timeout(_) => "Timeout",
            SdkError::NetworkUnsupported(_) => "NetworkUnsupported",
            SdkError::UnsupportedTarget(_) => "UnsupportedTarget",
            SdkError::MethodNotFound(_) => "MethodNotFound",
            SdkError::EventNotFound(_) => "EventNotFound",
            SdkError::SignerRequired => "SignerRequired",
            SdkError::SessionNotFound(_) => "SessionNotFound",
            SdkError::InvalidInput(_) => "InvalidInput",
            SdkError::Provider(_) => "ProviderError",
            SdkError::RequestFailed(_) => "RequestFailed",
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::RequestFailed(format!("Malformed response body: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
