use alloy::json_abi::JsonAbi;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::ai::AiClient;
use crate::compiler::CompilerClient;
use crate::deployment::DeploymentClient;
use crate::error::{Result, SdkError};
use crate::ethereum::contract::{ContractClient, ContractHandle};
use crate::ethereum::networks::Networks;
use crate::ethereum::provider::ProviderManager;
use crate::events::{EventBus, SdkEvent};
use crate::transport::{HttpBackend, ReqwestBackend, Transport};
use crate::types::{
    CompilationResult, CompileOptions, CompileTarget, ConfigUpdate, DeploymentRequest,
    DeploymentResult, SdkConfig,
};

/// Options for [`ContractIde::create_and_deploy`].
#[derive(Debug, Clone)]
pub struct CreateAndDeployOptions {
    /// Compiler target by name: solidity, vyper or rust
    pub target: String,
    pub network: String,
    pub constructor_params: Vec<Value>,
    pub private_key: Option<String>,
    pub compile: CompileOptions,
}

impl CreateAndDeployOptions {
    pub fn new(target: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            network: network.into(),
            constructor_params: Vec::new(),
            private_key: None,
            compile: CompileOptions::default(),
        }
    }
}

/// Everything produced by a successful [`ContractIde::create_and_deploy`].
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub compilation: CompilationResult,
    pub deployment: DeploymentResult,
    pub contract: ContractHandle,
}

/// Single entry point composing the compiler, deployment, contract and AI
/// clients behind one configuration and one event stream.
#[derive(Debug, Clone)]
pub struct ContractIde {
    compiler: CompilerClient,
    deployment: DeploymentClient,
    contracts: ContractClient,
    ai: AiClient,
    events: EventBus,
}

impl ContractIde {
    pub fn new(config: SdkConfig) -> Self {
        Self::with_backend(config, Networks::builtin(), Arc::new(ReqwestBackend::new()))
    }

    /// Build on an explicit network table and HTTP backend.
    pub fn with_backend(config: SdkConfig, networks: Networks, backend: Arc<dyn HttpBackend>) -> Self {
        let providers = ProviderManager::new(Arc::new(networks));
        let transport = || Transport::with_backend(&config, backend.clone());

        let ide = Self {
            compiler: CompilerClient::with_transport(transport()),
            deployment: DeploymentClient::with_transport(transport(), providers.clone(), &config),
            contracts: ContractClient::with_transport(transport(), providers),
            ai: AiClient::with_transport(transport(), &config),
            events: EventBus::new(),
        };

        ide.compiler.events().forward_to(&ide.events);
        ide.deployment.events().forward_to(&ide.events);
        ide.contracts.events().forward_to(&ide.events);
        ide.ai.events().forward_to(&ide.events);

        tracing::debug!("SDK ready for {}", config.api_url);
        ide
    }

    pub fn compiler(&self) -> &CompilerClient {
        &self.compiler
    }

    pub fn deployment(&self) -> &DeploymentClient {
        &self.deployment
    }

    pub fn contracts(&self) -> &ContractClient {
        &self.contracts
    }

    pub fn ai(&self) -> &AiClient {
        &self.ai
    }

    /// Every event emitted by any client, in emission order per client.
    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }

    pub fn update_config(&self, update: ConfigUpdate) {
        self.compiler.update_config(&update);
        self.deployment.update_config(&update);
        self.contracts.update_config(&update);
        self.ai.update_config(&update);
    }

    pub fn contract(&self, address: &str, abi: JsonAbi, network: &str) -> Result<ContractHandle> {
        self.contracts.contract(address, abi, network)
    }

    /// Compile `code`, deploy the artifact and bind a handle to the new
    /// contract. Nothing is rolled back when a later step fails.
    pub async fn create_and_deploy(
        &self,
        code: &str,
        options: CreateAndDeployOptions,
    ) -> Result<DeployedContract> {
        let target: CompileTarget = options.target.parse()?;

        let compilation = self.compiler.compile(code, target, &options.compile).await?;
        if !compilation.success {
            let error = compilation.first_error().unwrap_or("Compilation failed");
            return Err(SdkError::RequestFailed(format!("Compilation failed: {}", error)));
        }

        let (bytecode, abi) = match (&compilation.bytecode, &compilation.abi) {
            (Some(bytecode), Some(abi)) => (bytecode.clone(), abi.clone()),
            _ => {
                return Err(SdkError::RequestFailed(
                    "Compilation succeeded without bytecode or ABI".to_string(),
                ))
            }
        };

        let mut request = DeploymentRequest::new(bytecode, abi.clone(), options.network.clone());
        request.constructor_params = options.constructor_params;

        let deployment = self
            .deployment
            .deploy(&request, options.private_key.as_deref())
            .await?;
        if !deployment.success {
            let error = deployment.error.as_deref().unwrap_or("Deployment failed");
            return Err(SdkError::RequestFailed(format!("Deployment failed: {}", error)));
        }

        let address = deployment.contract_address.clone().unwrap_or_default();
        let mut contract = self.contracts.contract(&address, abi, &options.network)?;
        if let Some(key) = &options.private_key {
            contract = contract.with_signer(key)?;
        }

        tracing::info!("Created and deployed {} on {}", address, options.network);
        Ok(DeployedContract {
            compilation,
            deployment,
            contract,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBackend;
    use reqwest::Method;
    use serde_json::json;

    const ADDRESS: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    fn ide() -> (Arc<MockBackend>, ContractIde) {
        let mock = Arc::new(MockBackend::new());
        let config = SdkConfig {
            watch_confirmations: false,
            ..SdkConfig::default()
        };
        (mock.clone(), ContractIde::with_backend(config, Networks::builtin(), mock))
    }

    fn token_abi() -> Value {
        json!([{
            "type": "function",
            "name": "totalSupply",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [{"name": "", "type": "uint256"}]
        }])
    }

    #[tokio::test]
    async fn test_create_and_deploy_end_to_end() {
        let (mock, ide) = ide();
        mock.on(
            Method::POST,
            "/compile/vyper",
            200,
            json!({"success": true, "bytecode": "0x6080", "abi": token_abi()}),
        );
        mock.on(
            Method::POST,
            "/deploy/contract",
            200,
            json!({"success": true, "contractAddress": ADDRESS, "transactionHash": "0x123", "blockNumber": 9}),
        );
        let mut rx = ide.subscribe();

        let deployed = ide
            .create_and_deploy("def totalSupply() -> uint256: ...", CreateAndDeployOptions::new("Vyper", "localhost"))
            .await
            .unwrap();

        assert_eq!(mock.request_count(), 2);
        assert_eq!(deployed.deployment.contract_address.as_deref(), Some(ADDRESS));
        assert_eq!(deployed.contract.address_string(), ADDRESS);
        assert_eq!(deployed.contract.network(), "localhost");
        assert_eq!(deployed.contract.get_methods()[0].name, "totalSupply");
        assert_eq!(deployed.contract.abi(), deployed.compilation.abi.as_ref().unwrap());

        let deploy_body = mock.last_request().unwrap().body.unwrap();
        assert_eq!(deploy_body["bytecode"], "0x6080");

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "compilation:started",
                "compilation:completed",
                "deployment:started",
                "deployment:completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_unsupported_target_never_reaches_compiler() {
        let (mock, ide) = ide();
        let err = ide
            .create_and_deploy("x = 1", CreateAndDeployOptions::new("brainfuck", "localhost"))
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::UnsupportedTarget(_)));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_compile_failure_stops_before_deploy() {
        let (mock, ide) = ide();
        mock.on(
            Method::POST,
            "/compile/solidity",
            200,
            json!({"success": false, "errors": ["line 2: bad indent"]}),
        );

        let err = ide
            .create_and_deploy("x = 1", CreateAndDeployOptions::new("solidity", "localhost"))
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::RequestFailed(msg) if msg.contains("line 2: bad indent")));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_deploy_failure_is_raised() {
        let (mock, ide) = ide();
        mock.on(
            Method::POST,
            "/compile/rust",
            200,
            json!({"success": true, "bytecode": "0x00", "abi": []}),
        );
        mock.on(
            Method::POST,
            "/deploy/contract",
            200,
            json!({"success": true, "transactionHash": "0x123"}),
        );

        let err = ide
            .create_and_deploy("x = 1", CreateAndDeployOptions::new("rust", "localhost"))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::RequestFailed(msg) if msg.starts_with("Deployment failed")));
    }

    #[tokio::test]
    async fn test_update_config_reaches_every_client() {
        let (mock, ide) = ide();
        mock.on(Method::GET, "/compile/stats", 200, json!({}));
        mock.on(Method::GET, "/ai/status", 200, json!({"available": true}));

        ide.update_config(ConfigUpdate {
            api_url: Some("https://ide.example.com/api".into()),
            api_key: Some(Some("k".into())),
            timeout_ms: None,
        });

        ide.compiler().get_stats().await.unwrap();
        ide.ai().get_status().await.unwrap();

        for request in mock.requests() {
            assert!(request.url.starts_with("https://ide.example.com/api/"));
            assert_eq!(request.header("x-api-key"), Some("k"));
        }
    }

    #[tokio::test]
    async fn test_client_events_are_forwarded() {
        let (_, ide) = ide();
        let mut rx = ide.subscribe();

        ide.contracts().events().emit(SdkEvent::error("contract", "boom"));
        match rx.try_recv().unwrap() {
            SdkEvent::Error { source, message } => {
                assert_eq!(source, "contract");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
