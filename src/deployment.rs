use alloy::{
    network::ReceiptResponse,
    primitives::{Address, TxHash},
    providers::Provider,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, SdkError};
use crate::ethereum::{
    provider::{HttpProvider, ProviderManager},
    utils, ContractInfo, TxReceipt,
};
use crate::events::{EventBus, SdkEvent};
use crate::fallback::{self, Resolved};
use crate::transport::{unwrap_field, RequestOptions, Transport};
use crate::types::{
    new_session_id, ConfigUpdate, DeployResponse, DeploymentRecord, DeploymentRequest,
    DeploymentResult, DeploymentStatus, GasEstimate, GasPrice, GasPriceResponse, HistoryQuery,
    LookupSource, NetworkInfo, SdkConfig, VerificationRequest, VerificationResult,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployBody<'a> {
    #[serde(flatten)]
    request: &'a DeploymentRequest,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
struct ConfirmationSettings {
    watch: bool,
    timeout_ms: u64,
    poll_ms: u64,
}

/// Client for the deployment service, with direct chain access for
/// confirmations and fallback lookups.
#[derive(Debug, Clone)]
pub struct DeploymentClient {
    transport: Transport,
    providers: ProviderManager,
    events: EventBus,
    confirmation: ConfirmationSettings,
}

impl DeploymentClient {
    pub fn new(config: &SdkConfig, providers: ProviderManager) -> Self {
        Self::with_transport(Transport::new(config), providers, config)
    }

    pub fn with_transport(transport: Transport, providers: ProviderManager, config: &SdkConfig) -> Self {
        Self {
            transport,
            providers,
            events: EventBus::new(),
            confirmation: ConfirmationSettings {
                watch: config.watch_confirmations,
                timeout_ms: config.confirmation_timeout_ms,
                poll_ms: config.confirmation_poll_ms.max(1),
            },
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn update_config(&self, update: &ConfigUpdate) {
        self.transport.apply_update(update);
    }

    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!("{} failed: {}", operation, e);
            self.events.emit(SdkEvent::error("deployment", e.to_string()));
        }
        result
    }

    fn provider_error(&self, error: impl std::fmt::Display) -> SdkError {
        SdkError::Provider(utils::interpret_rpc_error(&error.to_string()))
    }

    /// Deploy through the backend.
    ///
    /// The network name and private key are checked locally first. A deployment
    /// the backend reports as failed is returned as `Ok` with
    /// `success == false`; a transport failure is returned as `Err`.
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        private_key: Option<&str>,
    ) -> Result<DeploymentResult> {
        let session_id = new_session_id("deploy");
        self.providers.network(&request.network)?;
        if let Some(key) = private_key {
            utils::parse_private_key(key)?;
        }

        tracing::info!("Deploying to {} ({})", request.network, session_id);
        self.events.emit(SdkEvent::DeploymentStarted {
            session_id: session_id.clone(),
            network: request.network.clone(),
        });

        let body = DeployBody {
            request,
            session_id: &session_id,
            private_key,
        };

        let response = match self.transport.post::<_, DeployResponse>("/deploy/contract", &body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Deployment {} request failed: {}", session_id, e);
                self.events.emit(SdkEvent::DeploymentFailed {
                    session_id,
                    error: e.to_string(),
                });
                self.events.emit(SdkEvent::error("deployment", e.to_string()));
                return Err(e);
            }
        };

        let result = DeploymentResult::from_response(&session_id, response);
        if !result.success {
            let error = result.error.clone().unwrap_or_default();
            tracing::warn!("Deployment {} failed: {}", session_id, error);
            self.events.emit(SdkEvent::DeploymentFailed { session_id, error });
            return Ok(result);
        }

        tracing::info!(
            "Deployment {} {}: {:?}",
            session_id,
            result.status,
            result.contract_address
        );
        self.events.emit(SdkEvent::DeploymentCompleted {
            session_id: session_id.clone(),
            result: result.clone(),
        });

        if result.status == DeploymentStatus::Pending && self.confirmation.watch {
            if let Some(tx_hash) = &result.transaction_hash {
                self.spawn_confirmation_watcher(session_id, tx_hash.clone(), request.network.clone());
            }
        }

        Ok(result)
    }

    fn spawn_confirmation_watcher(&self, session_id: String, tx_hash: String, network: String) {
        let client = self.clone();
        tokio::spawn(async move {
            match client.wait_for_confirmation(&tx_hash, &network, 1).await {
                Ok(receipt) => {
                    tracing::info!(
                        "Deployment {} mined in block {:?}, status {}",
                        session_id,
                        receipt.block_number,
                        receipt.status
                    );
                    for event in confirmation_events(session_id, receipt) {
                        client.events.emit(event);
                    }
                }
                Err(e) => tracing::warn!("Deployment {} was not confirmed: {}", session_id, e),
            }
        });
    }

    pub async fn estimate_deployment_gas(&self, request: &DeploymentRequest) -> Result<GasEstimate> {
        self.providers.network(&request.network)?;
        let result = self.transport.post("/deploy/estimate-gas", request).await;
        self.report("estimate_deployment_gas", result)
    }

    pub async fn verify_contract(&self, request: &VerificationRequest) -> Result<VerificationResult> {
        self.providers.network(&request.network)?;
        utils::validate_address(&request.contract_address)?;
        if request.source_code.trim().is_empty() {
            return Err(SdkError::InvalidInput("Source code cannot be empty".to_string()));
        }

        let result = self.transport.post("/deploy/verify", request).await;
        self.report("verify_contract", result)
    }

    pub async fn get_deployment_status(&self, session_id: &str) -> Result<DeploymentRecord> {
        let path = format!("/deploy/status/{}", session_id);
        let result = self
            .transport
            .get::<Value>(&path)
            .await
            .and_then(|value| unwrap_field(value, "deployment"));
        self.report("get_deployment_status", result)
    }

    pub async fn get_deployment_history(&self, query: &HistoryQuery) -> Result<Vec<DeploymentRecord>> {
        let mut options = RequestOptions::default();
        if let Some(network) = &query.network {
            options = options.query("network", network);
        }
        if let Some(limit) = query.limit {
            options = options.query("limit", limit);
        }

        let result = self
            .transport
            .get_with::<Value>("/deploy/history", options)
            .await
            .and_then(|value| unwrap_field(value, "deployments"));
        self.report("get_deployment_history", result)
    }

    pub async fn get_network_info(&self, network: &str) -> Result<NetworkInfo> {
        let descriptor = self.providers.network(network)?;
        let path = format!("/networks/{}/info", network);

        let result = self
            .transport
            .get::<Value>(&path)
            .await
            .and_then(|value| unwrap_field::<NetworkInfo>(value, "network"))
            .map(|mut info| {
                if info.name.is_empty() {
                    info.name = descriptor.name.clone();
                }
                info.chain_id = info.chain_id.or(Some(descriptor.chain_id));
                info.explorer_url = info.explorer_url.or_else(|| descriptor.explorer_url.clone());
                info
            });
        self.report("get_network_info", result)
    }

    /// Contract metadata from the backend, or read directly from the chain
    /// when the backend lookup fails.
    pub async fn get_contract_info(&self, address: &str, network: &str) -> Result<ContractInfo> {
        self.providers.network(network)?;
        let address = utils::validate_address(address)?;

        let result = fallback::resolve(
            "contract info",
            self.contract_info_from_backend(address, network),
            || self.contract_info_from_chain(address, network),
        )
        .await
        .map(|Resolved { value: mut info, source }| {
            info.address = address.to_checksum(None);
            info.network = network.to_string();
            info.source = Some(source);
            info
        });
        self.report("get_contract_info", result)
    }

    async fn contract_info_from_backend(&self, address: Address, network: &str) -> Result<ContractInfo> {
        let path = format!("/contracts/info/{}", address.to_checksum(None));
        let value: Value = self
            .transport
            .get_with(&path, RequestOptions::default().query("network", network))
            .await?;
        unwrap_field(value, "contract")
    }

    async fn contract_info_from_chain(&self, address: Address, network: &str) -> Result<ContractInfo> {
        let provider = self.providers.get_provider(network)?;
        let (code, balance, nonce) = tokio::try_join!(
            async { provider.get_code_at(address).await },
            async { provider.get_balance(address).await },
            async { provider.get_transaction_count(address).await },
        )
        .map_err(|e| self.provider_error(e))?;

        Ok(ContractInfo {
            is_contract: !code.is_empty(),
            bytecode_size: code.len(),
            balance: Some(balance.to_string()),
            transaction_count: Some(nonce),
            ..ContractInfo::default()
        })
    }

    /// Current gas price from the backend, or from the node's fee data when
    /// the backend lookup fails.
    pub async fn get_gas_price(&self, network: &str) -> Result<GasPrice> {
        self.providers.network(network)?;

        let result = fallback::resolve(
            "gas price",
            self.gas_price_from_backend(network),
            || self.gas_price_from_chain(network),
        )
        .await
        .map(|Resolved { value, source }| GasPrice { source, ..value });
        self.report("get_gas_price", result)
    }

    async fn gas_price_from_backend(&self, network: &str) -> Result<GasPrice> {
        let path = format!("/networks/{}/gas", network);
        let value: Value = self.transport.get(&path).await?;
        let response: GasPriceResponse = unwrap_field(value, "gas")?;
        let gas_price = response.gas_price.ok_or_else(|| {
            SdkError::RequestFailed("Gas price missing from backend response".to_string())
        })?;

        Ok(GasPrice {
            gas_price,
            max_fee_per_gas: response.max_fee_per_gas,
            max_priority_fee_per_gas: response.max_priority_fee_per_gas,
            source: LookupSource::Backend,
        })
    }

    async fn gas_price_from_chain(&self, network: &str) -> Result<GasPrice> {
        let provider = self.providers.get_provider(network)?;
        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|e| self.provider_error(e))?;
        // Legacy-only chains have no fee history
        let fees = provider.estimate_eip1559_fees(None).await.ok();

        Ok(GasPrice {
            gas_price: gas_price.to_string(),
            max_fee_per_gas: fees.as_ref().map(|f| f.max_fee_per_gas.to_string()),
            max_priority_fee_per_gas: fees.map(|f| f.max_priority_fee_per_gas.to_string()),
            source: LookupSource::Chain,
        })
    }

    /// Poll for the receipt of `tx_hash` until it has `confirmations` blocks
    /// on top of it (at least one), failing with `Timeout` after the
    /// configured confirmation timeout.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: &str,
        network: &str,
        confirmations: u64,
    ) -> Result<TxReceipt> {
        let hash = utils::validate_tx_hash(tx_hash)?;
        let provider = self.providers.get_provider(network)?;
        let timeout_ms = self.confirmation.timeout_ms;

        let result = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.poll_receipt(&provider, hash, confirmations.max(1)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SdkError::Timeout(timeout_ms)),
        };
        self.report("wait_for_confirmation", result)
    }

    async fn poll_receipt(
        &self,
        provider: &HttpProvider,
        hash: TxHash,
        confirmations: u64,
    ) -> Result<TxReceipt> {
        let interval = Duration::from_millis(self.confirmation.poll_ms);

        loop {
            let receipt = provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| self.provider_error(e))?;

            if let Some(receipt) = receipt {
                if let Some(mined_in) = receipt.block_number {
                    let head = provider
                        .get_block_number()
                        .await
                        .map_err(|e| self.provider_error(e))?;
                    let depth = head.saturating_sub(mined_in) + 1;

                    if depth >= confirmations {
                        return Ok(TxReceipt {
                            transaction_hash: format!("0x{:x}", hash),
                            block_number: Some(mined_in),
                            gas_used: receipt.gas_used() as u64,
                            status: receipt.status(),
                            contract_address: receipt.contract_address.map(|a| a.to_checksum(None)),
                            confirmations: depth,
                        });
                    }
                    tracing::debug!("0x{:x} has {}/{} confirmations", hash, depth, confirmations);
                }
            }

            tokio::time::sleep(interval).await;
        }
    }
}

/// Events closing out a pending deployment once its receipt is mined: a
/// reverted receipt fails the deployment instead of confirming it.
fn confirmation_events(session_id: String, receipt: TxReceipt) -> Vec<SdkEvent> {
    if receipt.status {
        return vec![SdkEvent::TransactionConfirmed { session_id, receipt }];
    }

    let error = format!("Deployment transaction {} reverted", receipt.transaction_hash);
    vec![
        SdkEvent::DeploymentFailed {
            session_id,
            error: error.clone(),
        },
        SdkEvent::error("deployment", error),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::networks::Networks;
    use crate::transport::MockBackend;
    use alloy::json_abi::JsonAbi;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::broadcast::Receiver;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn client() -> (Arc<MockBackend>, DeploymentClient) {
        let mock = Arc::new(MockBackend::new());
        let config = SdkConfig {
            watch_confirmations: false,
            ..SdkConfig::default()
        };
        let transport = Transport::with_backend(&config, mock.clone());
        let providers = ProviderManager::new(Arc::new(Networks::builtin()));
        (mock, DeploymentClient::with_transport(transport, providers, &config))
    }

    fn request(network: &str) -> DeploymentRequest {
        DeploymentRequest::new("0x6080", JsonAbi::new(), network)
    }

    fn drain(rx: &mut Receiver<SdkEvent>) -> Vec<SdkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[SdkEvent]) -> Vec<&'static str> {
        events.iter().map(SdkEvent::name).collect()
    }

    #[tokio::test]
    async fn test_unknown_network_makes_no_requests() {
        let (mock, client) = client();
        let mut rx = client.events().subscribe();

        assert!(matches!(
            client.deploy(&request("atlantis"), None).await,
            Err(SdkError::NetworkUnsupported(n)) if n == "atlantis"
        ));
        assert!(matches!(
            client.estimate_deployment_gas(&request("atlantis")).await,
            Err(SdkError::NetworkUnsupported(_))
        ));
        assert!(matches!(
            client.get_gas_price("atlantis").await,
            Err(SdkError::NetworkUnsupported(_))
        ));
        assert_eq!(mock.request_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_private_key_makes_no_requests() {
        let (mock, client) = client();
        assert!(matches!(
            client.deploy(&request("sepolia"), Some("0xdead")).await,
            Err(SdkError::InvalidInput(_))
        ));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_confirmed_deployment() {
        let (mock, client) = client();
        mock.on(
            Method::POST,
            "/deploy/contract",
            200,
            json!({
                "success": true,
                "contractAddress": "0xABC",
                "transactionHash": "0x123",
                "blockNumber": "42",
                "gasUsed": 512000
            }),
        );
        let mut rx = client.events().subscribe();

        let result = client.deploy(&request("sepolia"), Some(DEV_KEY)).await.unwrap();

        assert!(result.success);
        assert!(result.session_id.starts_with("deploy_"));
        assert_eq!(result.status, DeploymentStatus::Confirmed);
        assert_eq!(result.block_number, Some(42));

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["deployment:started", "deployment:completed"]);
        match &events[1] {
            SdkEvent::DeploymentCompleted { session_id, .. } => assert_eq!(session_id, &result.session_id),
            other => panic!("unexpected {:?}", other),
        }

        let body = mock.last_request().unwrap().body.unwrap();
        assert_eq!(body["bytecode"], "0x6080");
        assert_eq!(body["network"], "sepolia");
        assert_eq!(body["sessionId"], result.session_id.as_str());
        assert_eq!(body["privateKey"], DEV_KEY);
    }

    #[tokio::test]
    async fn test_pending_deployment_without_watcher() {
        let (mock, client) = client();
        mock.on(
            Method::POST,
            "/deploy/contract",
            200,
            json!({"success": true, "contractAddress": "0xABC", "transactionHash": "0x123"}),
        );
        let mut rx = client.events().subscribe();

        let result = client.deploy(&request("localhost"), None).await.unwrap();
        assert_eq!(result.status, DeploymentStatus::Pending);
        assert!(mock.last_request().unwrap().body.unwrap().get("privateKey").is_none());

        tokio::task::yield_now().await;
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["deployment:started", "deployment:completed"]
        );
    }

    #[tokio::test]
    async fn test_reported_failure_returns_failed_result() {
        let (mock, client) = client();
        mock.on(
            Method::POST,
            "/deploy/contract",
            200,
            json!({"success": false, "error": "insufficient funds"}),
        );
        let mut rx = client.events().subscribe();

        let result = client.deploy(&request("sepolia"), None).await.unwrap();
        assert!(!result.success);
        assert!(result.contract_address.is_none());
        assert_eq!(result.error.as_deref(), Some("insufficient funds"));

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["deployment:started", "deployment:failed"]);
        match &events[1] {
            SdkEvent::DeploymentFailed { session_id, error } => {
                assert_eq!(session_id, &result.session_id);
                assert_eq!(error, "insufficient funds");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_raised() {
        let (mock, client) = client();
        mock.on(Method::POST, "/deploy/contract", 401, json!({}));
        let mut rx = client.events().subscribe();

        assert!(matches!(
            client.deploy(&request("sepolia"), None).await,
            Err(SdkError::Unauthorized(_))
        ));
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["deployment:started", "deployment:failed", "error"]
        );
    }

    #[tokio::test]
    async fn test_history_query() {
        let (mock, client) = client();
        mock.on(
            Method::GET,
            "/deploy/history",
            200,
            json!({"success": true, "deployments": [
                {"sessionId": "deploy_1_abc", "status": "confirmed", "blockNumber": 7},
                {"sessionId": "deploy_2_def", "status": "failed", "error": "reverted"}
            ]}),
        );

        let history = client
            .get_deployment_history(&HistoryQuery {
                network: Some("sepolia".into()),
                limit: Some(2),
            })
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, Some(DeploymentStatus::Confirmed));
        assert_eq!(history[0].block_number, Some(7));

        let sent = mock.last_request().unwrap();
        assert_eq!(sent.query_param("network"), Some("sepolia"));
        assert_eq!(sent.query_param("limit"), Some("2"));
    }

    #[tokio::test]
    async fn test_status_and_estimate() {
        let (mock, client) = client();
        mock.on(
            Method::GET,
            "/deploy/status/deploy_1_abc",
            200,
            json!({"success": true, "deployment": {"sessionId": "deploy_1_abc", "status": "pending"}}),
        );
        mock.on(
            Method::POST,
            "/deploy/estimate-gas",
            200,
            json!({"success": true, "gasEstimate": "150000", "gasPrice": 20, "estimatedCost": "0.003"}),
        );

        let record = client.get_deployment_status("deploy_1_abc").await.unwrap();
        assert_eq!(record.status, Some(DeploymentStatus::Pending));

        let estimate = client.estimate_deployment_gas(&request("polygon")).await.unwrap();
        assert_eq!(estimate.gas_estimate, 150_000);
        assert_eq!(estimate.gas_price.as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_backend_answers_take_priority() {
        let (mock, client) = client();
        let address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
        mock.on(
            Method::GET,
            "/networks/sepolia/gas",
            200,
            json!({"success": true, "gasPrice": "1500000000"}),
        );
        mock.on(
            Method::GET,
            &format!("/contracts/info/{}", address),
            200,
            json!({"success": true, "contract": {"name": "Token", "isContract": true, "bytecodeSize": 1024}}),
        );

        let gas = client.get_gas_price("sepolia").await.unwrap();
        assert_eq!(gas.gas_price, "1500000000");
        assert_eq!(gas.source, LookupSource::Backend);

        let info = client.get_contract_info(address, "sepolia").await.unwrap();
        assert_eq!(info.source, Some(LookupSource::Backend));
        assert_eq!(info.name.as_deref(), Some("Token"));
        assert_eq!(info.network, "sepolia");
        assert_eq!(info.address, address);
        assert_eq!(mock.last_request().unwrap().query_param("network"), Some("sepolia"));
    }

    #[tokio::test]
    async fn test_network_info_fills_from_table() {
        let (mock, client) = client();
        mock.on(
            Method::GET,
            "/networks/polygon/info",
            200,
            json!({"success": true, "network": {"blockNumber": "0x10"}}),
        );

        let info = client.get_network_info("polygon").await.unwrap();
        assert_eq!(info.name, "polygon");
        assert_eq!(info.chain_id, Some(137));
        assert_eq!(info.block_number, Some(16));
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_rejects_bad_hash() {
        let (_, client) = client();
        assert!(matches!(
            client.wait_for_confirmation("0x123", "localhost", 1).await,
            Err(SdkError::InvalidInput(_))
        ));
    }

    fn receipt(status: bool) -> TxReceipt {
        TxReceipt {
            transaction_hash: format!("0x{}", "ab".repeat(32)),
            block_number: Some(12),
            gas_used: 21_000,
            status,
            contract_address: Some("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".to_string()),
            confirmations: 1,
        }
    }

    #[test]
    fn test_successful_receipt_confirms_deployment() {
        let events = confirmation_events("deploy_1_a".to_string(), receipt(true));
        assert_eq!(names(&events), vec!["transaction:confirmed"]);
        match &events[0] {
            SdkEvent::TransactionConfirmed { session_id, receipt } => {
                assert_eq!(session_id, "deploy_1_a");
                assert_eq!(receipt.block_number, Some(12));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reverted_receipt_fails_deployment() {
        let events = confirmation_events("deploy_1_a".to_string(), receipt(false));
        assert_eq!(names(&events), vec!["deployment:failed", "error"]);
        match &events[0] {
            SdkEvent::DeploymentFailed { session_id, error } => {
                assert_eq!(session_id, "deploy_1_a");
                assert!(error.contains("reverted"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
