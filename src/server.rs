use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    error::SdkError,
    ethereum::{abi, utils, TxOptions},
    sdk::{ContractIde, CreateAndDeployOptions},
    types::{ChatOptions, CompileOptions, DeploymentRequest},
};

/// MCP tool server exposing the SDK over stdio.
#[derive(Debug, Clone)]
pub struct ContractIdeServer {
    ide: Arc<ContractIde>,
    config: Arc<Config>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CompileRequest {
    code: String,
    /// solidity, vyper or rust
    target: String,
    optimization: Option<bool>,
    version: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ValidateRequest {
    code: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ExamplesRequest {
    category: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct DeployRequest {
    bytecode: String,
    abi: Value,
    network: Option<String>,
    constructor_params: Option<Vec<Value>>,
    private_key: Option<String>,
    gas_limit: Option<u64>,
    value: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CreateAndDeployRequest {
    code: String,
    target: String,
    network: Option<String>,
    constructor_params: Option<Vec<Value>>,
    private_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct DeploymentStatusRequest {
    session_id: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct NetworkRequest {
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ContractInfoRequest {
    address: String,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct AbiRequest {
    abi: Value,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ContractCallRequest {
    contract_address: String,
    abi: Value,
    function_name: String,
    parameters: Value,
    from: Option<String>,
    value: Option<String>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SendTransactionRequest {
    contract_address: String,
    abi: Value,
    function_name: String,
    parameters: Value,
    private_key: String,
    value: Option<String>,
    gas_limit: Option<u64>,
    gas_price: Option<String>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ContractEventsRequest {
    contract_address: String,
    abi: Value,
    event_name: Option<String>,
    from_block: Option<u64>,
    to_block: Option<u64>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
    context: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ReviewRequest {
    code: String,
    focus: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct GenerateRequest {
    description: String,
    template: Option<String>,
}

fn render<T: Serialize>(operation: &str, result: std::result::Result<T, SdkError>) -> String {
    match result {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| format!("Failed to serialize {} result", operation)),
        Err(e) => {
            error!("Failed to {}: {}", operation, e);
            format!("Error: {}", e)
        }
    }
}

const WRITES_DISABLED: &str =
    "Error: Write operations are disabled. Use --allow-writes flag to enable deployments and transactions.";

impl ContractIdeServer {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ide = ContractIde::with_backend(
            config.sdk.clone(),
            config.network_table(),
            Arc::new(crate::transport::ReqwestBackend::new()),
        );
        Ok(Self::with_ide(config, ide))
    }

    pub fn with_ide(config: Config, ide: ContractIde) -> Self {
        Self {
            ide: Arc::new(ide),
            config: Arc::new(config),
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting Contract IDE MCP server");

        let service = self.clone().serve(stdio()).await?;

        info!("Contract IDE MCP server started successfully");
        let _ = service.waiting().await;
        Ok(())
    }

    fn network(&self, network: Option<String>) -> String {
        network.unwrap_or_else(|| self.config.default_network.clone())
    }

    /// `Some(error text)` when a write must be refused.
    fn check_write(&self, value: Option<&str>) -> Option<String> {
        if !self.config.security.allow_write_operations {
            return Some(WRITES_DISABLED.to_string());
        }

        let (Some(value), Some(max)) = (value, &self.config.security.max_transaction_value) else {
            return None;
        };
        match (utils::validate_hex_value(value), utils::validate_hex_value(max)) {
            (Ok(value), Ok(max)) if value > max => Some(format!(
                "Error: Transaction value {} wei exceeds the configured maximum of {} wei",
                value, max
            )),
            (Err(e), _) => Some(format!("Error: {}", e)),
            _ => None,
        }
    }
}

#[tool(tool_box)]
impl ContractIdeServer {
    #[tool(description = "Compile contract source to solidity, vyper or rust (Stylus)")]
    async fn compile_contract(&self, #[tool(aggr)] request: CompileRequest) -> String {
        let options = CompileOptions {
            optimization: request.optimization.unwrap_or(true),
            version: request.version,
        };
        render(
            "compile contract",
            self.ide
                .compiler()
                .compile_for(&request.code, &request.target, &options)
                .await,
        )
    }

    #[tool(description = "Check contract source for syntax errors without compiling")]
    async fn validate_code(&self, #[tool(aggr)] request: ValidateRequest) -> String {
        render("validate code", self.ide.compiler().validate(&request.code).await)
    }

    #[tool(description = "List example contracts, optionally filtered by category")]
    async fn list_examples(&self, #[tool(aggr)] request: ExamplesRequest) -> String {
        render(
            "list examples",
            self.ide.compiler().get_examples(request.category.as_deref()).await,
        )
    }

    #[tool(description = "Deploy compiled bytecode through the IDE backend")]
    async fn deploy_contract(&self, #[tool(aggr)] request: DeployRequest) -> String {
        if let Some(refusal) = self.check_write(request.value.as_deref()) {
            return refusal;
        }

        let abi = match abi::parse_abi(&request.abi) {
            Ok(abi) => abi,
            Err(e) => return format!("Error: {}", e),
        };
        let network = self.network(request.network);
        let mut deployment = DeploymentRequest::new(request.bytecode, abi, network.clone());
        deployment.constructor_params = request.constructor_params.unwrap_or_default();
        deployment.gas_limit = request.gas_limit;
        deployment.value = request.value;

        let result = self
            .ide
            .deployment()
            .deploy(&deployment, request.private_key.as_deref())
            .await;

        match result {
            Ok(result) => {
                let explorer = result
                    .transaction_hash
                    .as_deref()
                    .and_then(|hash| self.config.network_table().explorer_tx_url(&network, hash));
                render(
                    "deploy contract",
                    Ok(serde_json::json!({ "deployment": result, "explorerUrl": explorer })),
                )
            }
            Err(e) => render::<Value>("deploy contract", Err(e)),
        }
    }

    #[tool(description = "Compile contract source and deploy the result in one step")]
    async fn create_and_deploy(&self, #[tool(aggr)] request: CreateAndDeployRequest) -> String {
        if let Some(refusal) = self.check_write(None) {
            return refusal;
        }

        let mut options = CreateAndDeployOptions::new(request.target, self.network(request.network));
        options.constructor_params = request.constructor_params.unwrap_or_default();
        options.private_key = request.private_key;

        let result = self
            .ide
            .create_and_deploy(&request.code, options)
            .await
            .map(|deployed| {
                serde_json::json!({
                    "contractAddress": deployed.contract.address_string(),
                    "network": deployed.contract.network(),
                    "deployment": deployed.deployment,
                    "methods": deployed.contract.get_methods(),
                })
            });
        render("create and deploy", result)
    }

    #[tool(description = "Estimate the gas needed to deploy compiled bytecode")]
    async fn estimate_deployment_gas(&self, #[tool(aggr)] request: DeployRequest) -> String {
        let abi = match abi::parse_abi(&request.abi) {
            Ok(abi) => abi,
            Err(e) => return format!("Error: {}", e),
        };
        let mut deployment = DeploymentRequest::new(request.bytecode, abi, self.network(request.network));
        deployment.constructor_params = request.constructor_params.unwrap_or_default();
        deployment.value = request.value;

        render(
            "estimate deployment gas",
            self.ide.deployment().estimate_deployment_gas(&deployment).await,
        )
    }

    #[tool(description = "Get the status of a deployment by session id")]
    async fn get_deployment_status(&self, #[tool(aggr)] request: DeploymentStatusRequest) -> String {
        render(
            "get deployment status",
            self.ide.deployment().get_deployment_status(&request.session_id).await,
        )
    }

    #[tool(description = "Get the current gas price of a network")]
    async fn get_gas_price(&self, #[tool(aggr)] request: NetworkRequest) -> String {
        let network = self.network(request.network);
        render("get gas price", self.ide.deployment().get_gas_price(&network).await)
    }

    #[tool(description = "Get information about a deployed smart contract")]
    async fn get_contract_info(&self, #[tool(aggr)] request: ContractInfoRequest) -> String {
        let network = self.network(request.network);
        render(
            "get contract info",
            self.ide
                .deployment()
                .get_contract_info(&request.address, &network)
                .await,
        )
    }

    #[tool(description = "List the methods and events declared by a contract ABI")]
    async fn describe_abi(&self, #[tool(aggr)] request: AbiRequest) -> String {
        let result = abi::parse_abi(&request.abi).map(|abi| {
            let index = abi::AbiIndex::new(abi);
            serde_json::json!({ "methods": index.methods(), "events": index.events() })
        });
        render("describe ABI", result)
    }

    #[tool(description = "Call a read-only contract function")]
    async fn call_contract_function(&self, #[tool(aggr)] request: ContractCallRequest) -> String {
        let network = self.network(request.network);
        let result = async {
            let abi = abi::parse_abi(&request.abi)?;
            let contract = self.ide.contract(&request.contract_address, abi, &network)?;
            contract.call(&request.function_name, &request.parameters).await
        }
        .await;
        render("call contract function", result)
    }

    #[tool(description = "Estimate gas cost for a contract function call")]
    async fn estimate_gas(&self, #[tool(aggr)] request: ContractCallRequest) -> String {
        let network = self.network(request.network);
        let options = TxOptions {
            value: request.value,
            from: request.from,
            ..TxOptions::default()
        };
        let result = async {
            let abi = abi::parse_abi(&request.abi)?;
            let contract = self.ide.contract(&request.contract_address, abi, &network)?;
            contract
                .estimate_gas(&request.function_name, &request.parameters, &options)
                .await
        }
        .await;

        match result {
            Ok(gas) => format!("Estimated gas: {} units", gas),
            Err(e) => render::<u64>("estimate gas", Err(e)),
        }
    }

    #[tool(description = "Send a transaction to execute a contract function")]
    async fn send_transaction(&self, #[tool(aggr)] request: SendTransactionRequest) -> String {
        if let Some(refusal) = self.check_write(request.value.as_deref()) {
            return refusal;
        }

        let network = self.network(request.network);
        let options = TxOptions {
            value: request.value,
            gas_limit: request.gas_limit,
            gas_price: request.gas_price,
            from: None,
        };
        let result = async {
            let abi = abi::parse_abi(&request.abi)?;
            let contract = self
                .ide
                .contract(&request.contract_address, abi, &network)?
                .with_signer(&request.private_key)?;
            contract
                .send(&request.function_name, &request.parameters, &options)
                .await
        }
        .await;
        render("send transaction", result)
    }

    #[tool(description = "Get decoded events emitted by a smart contract")]
    async fn get_contract_events(&self, #[tool(aggr)] request: ContractEventsRequest) -> String {
        let network = self.network(request.network);
        let result = async {
            let abi = abi::parse_abi(&request.abi)?;
            let contract = self.ide.contract(&request.contract_address, abi, &network)?;
            contract
                .get_past_events(request.event_name.as_deref(), request.from_block, request.to_block)
                .await
        }
        .await;
        render("get contract events", result)
    }

    #[tool(description = "Chat with the contract assistant; omit session_id to start a new session")]
    async fn ai_chat(&self, #[tool(aggr)] request: ChatRequest) -> String {
        let options = ChatOptions {
            session_id: request.session_id,
            context: request.context,
        };
        render("chat", self.ide.ai().chat(&request.message, options).await)
    }

    #[tool(description = "Ask the assistant to review contract code")]
    async fn ai_review_code(&self, #[tool(aggr)] request: ReviewRequest) -> String {
        render(
            "review code",
            self.ide
                .ai()
                .review_code(&request.code, request.focus.as_deref())
                .await,
        )
    }

    #[tool(description = "Ask the assistant to write a contract from a description")]
    async fn ai_generate_contract(&self, #[tool(aggr)] request: GenerateRequest) -> String {
        render(
            "generate contract",
            self.ide
                .ai()
                .generate_contract(&request.description, request.template.as_deref())
                .await,
        )
    }
}

#[tool(tool_box)]
impl ServerHandler for ContractIdeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("MCP server for a smart-contract IDE. Compiles contract source to Solidity, Vyper or Stylus Rust, deploys through the IDE backend, calls and inspects deployed contracts with Alloy, and talks to the contract assistant. Deployments and transactions require --allow-writes.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
