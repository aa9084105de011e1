//! Lifecycle events and the broadcast bus that carries them.
//!
//! Every client owns an [`EventBus`]. The facade wires each client bus into its
//! own bus once, at construction time, through [`EventBus::forward_to`]; after
//! that every event emitted by a client is delivered verbatim to both buses.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::ethereum::{EventRecord, TxReceipt};
use crate::types::{AiResponse, CompilationResult, CompileTarget, DeploymentResult};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SdkEvent {
    CompilationStarted {
        session_id: String,
        target: CompileTarget,
    },
    CompilationCompleted {
        session_id: String,
        result: CompilationResult,
    },
    CompilationFailed {
        session_id: String,
        error: String,
    },
    DeploymentStarted {
        session_id: String,
        network: String,
    },
    DeploymentCompleted {
        session_id: String,
        result: DeploymentResult,
    },
    DeploymentFailed {
        session_id: String,
        error: String,
    },
    TransactionConfirmed {
        session_id: String,
        receipt: TxReceipt,
    },
    TransactionSent {
        contract_address: String,
        method: String,
        transaction_hash: String,
    },
    ContractEvent(EventRecord),
    AiResponse {
        session_id: Option<String>,
        operation: String,
        response: AiResponse,
    },
    Error {
        source: String,
        message: String,
    },
}

impl SdkEvent {
    /// The `domain:action` name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            SdkEvent::CompilationStarted { .. } => "compilation:started",
            SdkEvent::CompilationCompleted { .. } => "compilation:completed",
            SdkEvent::CompilationFailed { .. } => "compilation:failed",
            SdkEvent::DeploymentStarted { .. } => "deployment:started",
            SdkEvent::DeploymentCompleted { .. } => "deployment:completed",
            SdkEvent::DeploymentFailed { .. } => "deployment:failed",
            SdkEvent::TransactionConfirmed { .. } => "transaction:confirmed",
            SdkEvent::TransactionSent { .. } => "transaction:sent",
            SdkEvent::ContractEvent(_) => "contract:event",
            SdkEvent::AiResponse { .. } => "ai:response",
            SdkEvent::Error { .. } => "error",
        }
    }

    pub(crate) fn error(source: &str, message: impl Into<String>) -> Self {
        SdkEvent::Error {
            source: source.to_string(),
            message: message.into(),
        }
    }
}

/// Broadcast bus with a forwarding registry.
///
/// Emitting never blocks and never fails: an event with no live subscriber is
/// dropped, and slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SdkEvent>,
    forwards: Arc<RwLock<Vec<broadcast::Sender<SdkEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            forwards: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }

    /// Register `target` so that everything emitted here is re-emitted there.
    pub fn forward_to(&self, target: &EventBus) {
        if let Ok(mut forwards) = self.forwards.write() {
            forwards.push(target.sender.clone());
        }
    }

    pub fn emit(&self, event: SdkEvent) {
        tracing::trace!(event = event.name(), "emit");
        if let Ok(forwards) = self.forwards.read() {
            for target in forwards.iter() {
                let _ = target.send(event.clone());
            }
        }
        let _ = self.sender.send(event);
    }
}
