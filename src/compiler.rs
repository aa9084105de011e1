use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SdkError};
use crate::events::{EventBus, SdkEvent};
use crate::transport::{unwrap_field, RequestOptions, Transport};
use crate::types::{
    new_session_id, CompilationResult, CompileOptions, CompileTarget, CompilerStats, ConfigUpdate,
    ContractExample, SdkConfig, ValidationReport,
};

#[derive(Serialize)]
struct CompileBody<'a> {
    code: &'a str,
    optimization: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
}

/// Client for the compiler service.
#[derive(Debug, Clone)]
pub struct CompilerClient {
    transport: Transport,
    events: EventBus,
}

impl CompilerClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self::with_transport(Transport::new(config))
    }

    pub fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn update_config(&self, update: &ConfigUpdate) {
        self.transport.apply_update(update);
    }

    /// Compile `code` for `target`.
    ///
    /// A compilation the backend reports as failed is returned as `Ok` with
    /// `success == false` and no artifacts; a transport failure is returned as
    /// `Err`. Either way exactly one of `compilation:completed` or
    /// `compilation:failed` follows `compilation:started`.
    pub async fn compile(
        &self,
        code: &str,
        target: CompileTarget,
        options: &CompileOptions,
    ) -> Result<CompilationResult> {
        let session_id = new_session_id("compile");
        tracing::info!("Compiling {} bytes for {} ({})", code.len(), target, session_id);

        self.events.emit(SdkEvent::CompilationStarted {
            session_id: session_id.clone(),
            target,
        });

        let body = CompileBody {
            code,
            optimization: options.optimization,
            version: options.version.as_deref(),
        };
        let path = format!("/compile/{}", target);

        match self.transport.post::<_, CompilationResult>(&path, &body).await {
            Ok(result) => {
                let result = result.normalized(&session_id, target);
                if result.success {
                    tracing::info!(
                        "Compilation {} succeeded with {} warning(s)",
                        session_id,
                        result.warnings.len()
                    );
                    self.events.emit(SdkEvent::CompilationCompleted {
                        session_id,
                        result: result.clone(),
                    });
                } else {
                    let error = result.first_error().unwrap_or("Compilation failed").to_string();
                    tracing::warn!("Compilation {} failed: {}", session_id, error);
                    self.events.emit(SdkEvent::CompilationFailed { session_id, error });
                }
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Compilation {} request failed: {}", session_id, e);
                self.events.emit(SdkEvent::CompilationFailed {
                    session_id,
                    error: e.to_string(),
                });
                self.events.emit(SdkEvent::error("compiler", e.to_string()));
                Err(e)
            }
        }
    }

    /// Like [`compile`](Self::compile) with the target given by name. An
    /// unknown name fails with `UnsupportedTarget` before any event or request.
    pub async fn compile_for(
        &self,
        code: &str,
        target: &str,
        options: &CompileOptions,
    ) -> Result<CompilationResult> {
        let target: CompileTarget = target.parse()?;
        self.compile(code, target, options).await
    }

    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!("{} failed: {}", operation, e);
            self.events.emit(SdkEvent::error("compiler", e.to_string()));
        }
        result
    }

    /// Syntax check without compiling.
    pub async fn validate(&self, code: &str) -> Result<ValidationReport> {
        if code.trim().is_empty() {
            return Err(SdkError::InvalidInput("Code cannot be empty".to_string()));
        }
        let result = self
            .transport
            .post("/compile/validate", &serde_json::json!({ "code": code }))
            .await;
        self.report("validate", result)
    }

    pub async fn get_examples(&self, category: Option<&str>) -> Result<Vec<ContractExample>> {
        let mut options = RequestOptions::default();
        if let Some(category) = category {
            options = options.query("category", category);
        }
        let result = self
            .transport
            .get_with::<Value>("/compile/examples", options)
            .await
            .and_then(|value| unwrap_field(value, "examples"));
        self.report("get_examples", result)
    }

    pub async fn get_stats(&self) -> Result<CompilerStats> {
        let result = self
            .transport
            .get::<Value>("/compile/stats")
            .await
            .and_then(|value| unwrap_field(value, "stats"));
        self.report("get_stats", result)
    }
}
