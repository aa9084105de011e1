use alloy::{
    json_abi::JsonAbi,
    network::{EthereumWallet, ReceiptResponse, TransactionBuilder},
    primitives::Address,
    providers::{Provider, ProviderBuilder},
    rpc::types::{Filter, Log, TransactionRequest},
    signers::local::PrivateKeySigner,
};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::abi::{self, AbiIndex, EventDescriptor, MethodDescriptor};
use super::networks::Networks;
use super::provider::{HttpProvider, ProviderManager};
use super::{utils, EventRecord, TransactionOutcome, TxOptions};
use crate::error::{Result, SdkError};
use crate::events::{EventBus, SdkEvent};
use crate::transport::{RequestOptions, Transport};
use crate::types::{ConfigUpdate, ContractSource, ContractTransaction, SdkConfig, VerificationStatus};

pub type EventCallback = Arc<dyn Fn(EventRecord) + Send + Sync>;

/// Provider bound to one deployed address on one network.
#[derive(Debug)]
struct ContractBinding {
    address: Address,
    network: String,
    rpc_url: String,
    provider: HttpProvider,
}

/// Factory for contract handles plus backend queries about deployed contracts.
#[derive(Debug, Clone)]
pub struct ContractClient {
    transport: Transport,
    providers: ProviderManager,
    bindings: Arc<Mutex<HashMap<(Address, String), Arc<ContractBinding>>>>,
    events: EventBus,
}

impl ContractClient {
    pub fn new(config: &SdkConfig, networks: Arc<Networks>) -> Self {
        Self::with_transport(Transport::new(config), ProviderManager::new(networks))
    }

    pub fn with_transport(transport: Transport, providers: ProviderManager) -> Self {
        Self {
            transport,
            providers,
            bindings: Arc::new(Mutex::new(HashMap::new())),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn update_config(&self, update: &ConfigUpdate) {
        self.transport.apply_update(update);
    }

    /// Build a handle for `address` on `network` using `abi`.
    ///
    /// The network name and address are checked before anything else; no RPC
    /// request is made.
    pub fn contract(&self, address: &str, abi: JsonAbi, network: &str) -> Result<ContractHandle> {
        self.providers.network(network)?;
        let address = utils::validate_address(address)?;
        let binding = self.binding(address, network)?;

        Ok(ContractHandle {
            binding,
            index: Arc::new(AbiIndex::new(abi)),
            signer: None,
            events: self.events.clone(),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn binding(&self, address: Address, network: &str) -> Result<Arc<ContractBinding>> {
        let key = (address, network.to_string());

        if let Some(binding) = self
            .bindings
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).cloned())
        {
            return Ok(binding);
        }

        let binding = Arc::new(ContractBinding {
            address,
            network: network.to_string(),
            rpc_url: self.providers.network(network)?.rpc_url.clone(),
            provider: self.providers.get_provider(network)?,
        });

        Ok(match self.bindings.lock() {
            Ok(mut cache) => cache.entry(key).or_insert(binding).clone(),
            Err(_) => binding,
        })
    }

    pub fn cached_bindings(&self) -> usize {
        self.bindings.lock().map(|cache| cache.len()).unwrap_or_default()
    }

    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!("{} failed: {}", operation, e);
            self.events.emit(SdkEvent::error("contract", e.to_string()));
        }
        result
    }

    pub async fn get_verification(&self, address: &str) -> Result<VerificationStatus> {
        let address = utils::validate_address(address)?;
        let path = format!("/contracts/{}/verification", address.to_checksum(None));
        let result = self.transport.get(&path).await;
        self.report("get_verification", result)
    }

    pub async fn get_source(&self, address: &str) -> Result<ContractSource> {
        let address = utils::validate_address(address)?;
        let path = format!("/contracts/{}/source", address.to_checksum(None));
        let result = self.transport.get(&path).await;
        self.report("get_source", result)
    }

    pub async fn get_transactions(
        &self,
        address: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ContractTransaction>> {
        let address = utils::validate_address(address)?;
        let path = format!("/contracts/{}/transactions", address.to_checksum(None));
        let mut options = RequestOptions::default();
        if let Some(limit) = limit {
            options = options.query("limit", limit);
        }

        #[derive(serde::Deserialize)]
        struct TransactionsResponse {
            #[serde(default)]
            transactions: Vec<ContractTransaction>,
        }

        let result = self
            .transport
            .get_with::<TransactionsResponse>(&path, options)
            .await
            .map(|r| r.transactions);
        self.report("get_transactions", result)
    }
}

/// A deployed contract: address, ABI and network, optionally bound to a signer.
///
/// Clones share the binding, the ABI index and the listener registry.
#[derive(Clone)]
pub struct ContractHandle {
    binding: Arc<ContractBinding>,
    index: Arc<AbiIndex>,
    signer: Option<PrivateKeySigner>,
    events: EventBus,
    listeners: Arc<Mutex<HashMap<String, Vec<JoinHandle<()>>>>>,
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("address", &self.binding.address)
            .field("network", &self.binding.network)
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .field("listeners", &self.listening_to())
            .finish()
    }
}

impl ContractHandle {
    pub fn address(&self) -> Address {
        self.binding.address
    }

    pub fn address_string(&self) -> String {
        self.binding.address.to_checksum(None)
    }

    pub fn network(&self) -> &str {
        &self.binding.network
    }

    pub fn abi(&self) -> &JsonAbi {
        self.index.abi()
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Same contract, bound to the signer derived from `private_key`.
    pub fn with_signer(&self, private_key: &str) -> Result<ContractHandle> {
        Ok(self.with_local_signer(utils::parse_private_key(private_key)?))
    }

    pub fn with_local_signer(&self, signer: PrivateKeySigner) -> ContractHandle {
        ContractHandle {
            signer: Some(signer),
            ..self.clone()
        }
    }

    pub fn get_methods(&self) -> Vec<MethodDescriptor> {
        self.index.methods()
    }

    pub fn get_events(&self) -> Vec<EventDescriptor> {
        self.index.events()
    }

    fn provider_error(&self, operation: &str, method: &str, error: impl fmt::Display) -> SdkError {
        let message = utils::interpret_rpc_error(&error.to_string());
        tracing::error!(
            "{} '{}' on {} ({}) failed: {}",
            operation,
            method,
            self.address_string(),
            self.binding.network,
            message
        );
        let error = SdkError::Provider(message);
        self.events.emit(SdkEvent::error("contract", error.to_string()));
        error
    }

    fn base_request(&self, method: &str, args: &Value) -> Result<(&alloy::json_abi::Function, TransactionRequest)> {
        let function = self.index.resolve_method(method, abi::arg_count(args))?;
        let calldata = abi::encode_call(function, args)?;
        let request = TransactionRequest::default()
            .to(self.binding.address)
            .input(calldata.into());
        Ok((function, request))
    }

    /// Invoke a read method with `eth_call` and decode its return value.
    pub async fn call(&self, method: &str, args: &Value) -> Result<Value> {
        let (function, mut request) = self.base_request(method, args)?;
        if let Some(from) = self.signer_address() {
            request = request.from(from);
        }

        tracing::debug!("eth_call {}.{}", self.address_string(), method);
        let output = self
            .binding
            .provider
            .call(&request)
            .await
            .map_err(|e| self.provider_error("call", method, e))?;

        abi::decode_output(function, &output)
    }

    /// Estimate gas for `method` without submitting a transaction.
    pub async fn estimate_gas(&self, method: &str, args: &Value, options: &TxOptions) -> Result<u64> {
        let (_, mut request) = self.base_request(method, args)?;

        if let Some(from) = self.signer_address() {
            request = request.from(from);
        } else if let Some(from) = &options.from {
            request = request.from(utils::validate_address(from)?);
        }
        if let Some(value) = &options.value {
            request = request.value(utils::validate_hex_value(value)?);
        }

        self.binding
            .provider
            .estimate_gas(&request)
            .await
            .map_err(|e| self.provider_error("estimate_gas", method, e))
    }

    /// Sign and submit a transaction calling `method`, then wait for its receipt.
    pub async fn send(&self, method: &str, args: &Value, options: &TxOptions) -> Result<TransactionOutcome> {
        let signer = self.signer.clone().ok_or(SdkError::SignerRequired)?;
        let (_, request) = self.base_request(method, args)?;
        let from = signer.address();

        let mut request = request.from(from);
        if let Some(value) = &options.value {
            request = request.value(utils::validate_hex_value(value)?);
        }
        if let Some(gas_limit) = options.gas_limit {
            request = request.with_gas_limit(gas_limit);
        }
        if let Some(gas_price) = &options.gas_price {
            request = request.with_gas_price(utils::parse_gas_price(gas_price)?);
        }

        let url: reqwest::Url = self.binding.rpc_url.parse().map_err(|e| {
            SdkError::InvalidInput(format!("Invalid RPC URL '{}': {}", self.binding.rpc_url, e))
        })?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(url);

        tracing::info!(
            "Sending {}.{} from {:?} on {}",
            self.address_string(),
            method,
            from,
            self.binding.network
        );

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| self.provider_error("send", method, e))?;
        let tx_hash = *pending.tx_hash();

        self.events.emit(SdkEvent::TransactionSent {
            contract_address: self.address_string(),
            method: method.to_string(),
            transaction_hash: format!("0x{:x}", tx_hash),
        });

        let receipt = pending.get_receipt().await.map_err(|e| {
            self.provider_error(
                "send",
                method,
                format!("transaction 0x{:x} was sent but confirmation failed: {}", tx_hash, e),
            )
        })?;

        Ok(TransactionOutcome {
            transaction_hash: format!("0x{:x}", tx_hash),
            from: from.to_checksum(None),
            to: self.address_string(),
            method: method.to_string(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used() as u64,
            effective_gas_price: receipt.effective_gas_price.to_string(),
            status: receipt.status(),
        })
    }

    /// Native balance of the contract, in wei.
    pub async fn get_balance(&self) -> Result<String> {
        self.binding
            .provider
            .get_balance(self.binding.address)
            .await
            .map(|balance| balance.to_string())
            .map_err(|e| self.provider_error("get_balance", "", e))
    }

    fn event_filter(&self, event: Option<&str>) -> Result<Filter> {
        let filter = Filter::new().address(self.binding.address);
        Ok(match event {
            Some(name) => filter.event_signature(self.index.event_topics(name)?),
            None => filter,
        })
    }

    /// Query logs in a block range and decode those matching the ABI.
    ///
    /// `to_block` defaults to the latest block.
    pub async fn get_past_events(
        &self,
        event: Option<&str>,
        from_block: Option<u64>,
        to_block: Option<u64>,
    ) -> Result<Vec<EventRecord>> {
        let mut filter = self.event_filter(event)?.from_block(from_block.unwrap_or(0));
        if let Some(to_block) = to_block {
            filter = filter.to_block(to_block);
        }

        let logs = self
            .binding
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| self.provider_error("get_past_events", event.unwrap_or("*"), e))?;

        Ok(logs
            .iter()
            .filter_map(|log| decode_log(&self.index, log))
            .collect())
    }

    /// Subscribe `callback` to live `event` logs. Must be called inside a
    /// Tokio runtime; the subscription polls the node until removed.
    pub fn add_event_listener<F>(&self, event: &str, callback: F) -> Result<()>
    where
        F: Fn(EventRecord) + Send + Sync + 'static,
    {
        let filter = self.event_filter(Some(event))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SdkError::InvalidInput("event listeners require a Tokio runtime".to_string())
        })?;

        let callback: EventCallback = Arc::new(callback);
        let provider = self.binding.provider.clone();
        let index = self.index.clone();
        let bus = self.events.clone();
        let name = event.to_string();

        let task = runtime.spawn(async move {
            let poller = match provider.watch_logs(&filter).await {
                Ok(poller) => poller,
                Err(e) => {
                    let message = utils::interpret_rpc_error(&e.to_string());
                    tracing::warn!("Subscription to '{}' failed: {}", name, message);
                    bus.emit(SdkEvent::error("contract", message));
                    return;
                }
            };

            let mut logs = Box::pin(poller.into_stream().flat_map(futures::stream::iter));
            while let Some(log) = logs.next().await {
                if let Some(record) = decode_log(&index, &log) {
                    bus.emit(SdkEvent::ContractEvent(record.clone()));
                    callback(record);
                }
            }
        });

        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.entry(event.to_string()).or_default().push(task);
        }
        Ok(())
    }

    /// Cancel every subscription for `event`. Returns whether any existed.
    pub fn remove_event_listener(&self, event: &str) -> bool {
        let removed = self
            .listeners
            .lock()
            .ok()
            .and_then(|mut listeners| listeners.remove(event));

        match removed {
            Some(tasks) => {
                tasks.iter().for_each(JoinHandle::abort);
                true
            }
            None => false,
        }
    }

    pub fn remove_all_listeners(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            for (_, tasks) in listeners.drain() {
                tasks.iter().for_each(JoinHandle::abort);
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.get(event).map_or(0, Vec::len))
            .unwrap_or_default()
    }

    fn listening_to(&self) -> Vec<String> {
        self.listeners
            .lock()
            .map(|listeners| listeners.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Decode `log` against the first ABI event whose topic matches.
fn decode_log(index: &AbiIndex, log: &Log) -> Option<EventRecord> {
    let topics = log.topics();
    let event = index.event_by_topic(topics.first()?)?;
    let data = &log.data().data;

    let args = match abi::decode_event_args(event, topics, data) {
        Ok(args) => args,
        Err(e) => {
            tracing::debug!("Skipping undecodable '{}' log: {}", event.name, e);
            return None;
        }
    };

    Some(EventRecord {
        name: event.name.clone(),
        signature: event.signature(),
        address: log.address().to_checksum(None),
        topics: topics.iter().map(|t| format!("0x{:x}", t)).collect(),
        data: format!("0x{}", hex::encode(data)),
        args,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash.map(|h| format!("0x{:x}", h)),
        log_index: log.log_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBackend;
    use reqwest::Method;
    use serde_json::json;

    const TOKEN: &str = "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e";
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn token_abi() -> JsonAbi {
        serde_json::from_value(json!([
            {
                "type": "function",
                "name": "transfer",
                "stateMutability": "nonpayable",
                "inputs": [
                    {"name": "to", "type": "address"},
                    {"name": "amount", "type": "uint256"}
                ],
                "outputs": [{"name": "", "type": "bool"}]
            },
            {
                "type": "event",
                "name": "Transfer",
                "anonymous": false,
                "inputs": [
                    {"name": "from", "type": "address", "indexed": true},
                    {"name": "to", "type": "address", "indexed": true},
                    {"name": "value", "type": "uint256", "indexed": false}
                ]
            }
        ]))
        .unwrap()
    }

    fn client() -> (Arc<MockBackend>, ContractClient) {
        let mock = Arc::new(MockBackend::new());
        let transport = Transport::with_backend(&SdkConfig::default(), mock.clone());
        let providers = ProviderManager::new(Arc::new(Networks::builtin()));
        (mock, ContractClient::with_transport(transport, providers))
    }

    #[test]
    fn test_unknown_network_fails_without_requests() {
        let (mock, client) = client();
        let err = client.contract(TOKEN, token_abi(), "neverland").unwrap_err();
        assert!(matches!(err, SdkError::NetworkUnsupported(name) if name == "neverland"));
        assert_eq!(mock.request_count(), 0);
        assert_eq!(client.cached_bindings(), 0);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let (_, client) = client();
        assert!(matches!(
            client.contract("0x1234", token_abi(), "localhost"),
            Err(SdkError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bindings_are_cached_per_address_and_network() {
        let (_, client) = client();
        let a = client.contract(TOKEN, token_abi(), "localhost").unwrap();
        let b = client.contract(TOKEN, JsonAbi::new(), "localhost").unwrap();
        assert_eq!(client.cached_bindings(), 1);
        assert!(Arc::ptr_eq(&a.binding, &b.binding));
        assert_eq!(b.get_methods().len(), 0);

        client.contract(TOKEN, token_abi(), "sepolia").unwrap();
        assert_eq!(client.cached_bindings(), 2);
    }

    #[test]
    fn test_methods_and_events_need_no_network() {
        let (mock, client) = client();
        let handle = client.contract(TOKEN, token_abi(), "localhost").unwrap();

        let methods = handle.get_methods();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "transfer");

        let events = handle.get_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Transfer");
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_send_requires_signer() {
        let (_, client) = client();
        let handle = client.contract(TOKEN, token_abi(), "localhost").unwrap();
        let mut errors = client.events().subscribe();

        let err = handle
            .send("transfer", &json!([TOKEN, 1]), &TxOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::SignerRequired));
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_method_fails_locally() {
        let (_, client) = client();
        let handle = client
            .contract(TOKEN, token_abi(), "localhost")
            .unwrap()
            .with_signer(DEV_KEY)
            .unwrap();

        assert!(matches!(
            handle.call("balanceOf", &json!([TOKEN])).await,
            Err(SdkError::MethodNotFound(name)) if name == "balanceOf"
        ));
        assert!(matches!(
            handle.send("mint", &json!([]), &TxOptions::default()).await,
            Err(SdkError::MethodNotFound(_))
        ));
        assert!(matches!(
            handle.estimate_gas("burn", &json!([]), &TxOptions::default()).await,
            Err(SdkError::MethodNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_gas_price_is_rejected_before_sending() {
        let (mock, client) = client();
        let handle = client
            .contract(TOKEN, token_abi(), "localhost")
            .unwrap()
            .with_signer(DEV_KEY)
            .unwrap();
        let options = TxOptions {
            gas_price: Some(format!("0x{}", "f".repeat(64))),
            ..TxOptions::default()
        };

        let err = handle
            .send("transfer", &json!([TOKEN, 1]), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::InvalidInput(_)));
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_with_signer() {
        let (_, client) = client();
        let handle = client.contract(TOKEN, token_abi(), "localhost").unwrap();
        assert!(!handle.has_signer());

        let signed = handle.with_signer(DEV_KEY).unwrap();
        assert!(signed.has_signer());
        assert!(!handle.has_signer());
        assert!(matches!(handle.with_signer("0xnope"), Err(SdkError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_listener_registry() {
        let (_, client) = client();
        let handle = client.contract(TOKEN, token_abi(), "localhost").unwrap();

        assert!(matches!(
            handle.add_event_listener("Approval", |_| {}),
            Err(SdkError::EventNotFound(_))
        ));

        handle.add_event_listener("Transfer", |_| {}).unwrap();
        handle.add_event_listener("Transfer", |_| {}).unwrap();
        assert_eq!(handle.listener_count("Transfer"), 2);

        assert!(handle.remove_event_listener("Transfer"));
        assert_eq!(handle.listener_count("Transfer"), 0);
        assert!(!handle.remove_event_listener("Transfer"));

        handle.add_event_listener("Transfer", |_| {}).unwrap();
        handle.remove_all_listeners();
        assert_eq!(handle.listener_count("Transfer"), 0);
    }

    #[tokio::test]
    async fn test_backend_contract_queries() {
        let (mock, client) = client();
        let checksummed = utils::validate_address(TOKEN).unwrap().to_checksum(None);
        mock.on(
            Method::GET,
            &format!("/contracts/{}/verification", checksummed),
            200,
            json!({"verified": true, "compilerVersion": "vyper-0.3.10"}),
        );
        mock.on(
            Method::GET,
            &format!("/contracts/{}/transactions", checksummed),
            200,
            json!({"success": true, "transactions": [{"hash": "0x01", "method": "transfer"}]}),
        );

        let verification = client.get_verification(TOKEN).await.unwrap();
        assert!(verification.verified);
        assert_eq!(verification.compiler_version.as_deref(), Some("vyper-0.3.10"));

        let transactions = client.get_transactions(TOKEN, Some(5)).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(mock.last_request().unwrap().query_param("limit"), Some("5"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_emitted_and_returned() {
        let (_, client) = client();
        let mut events = client.events().subscribe();

        assert!(client.get_source(TOKEN).await.is_err());
        match events.try_recv().unwrap() {
            SdkEvent::Error { source, .. } => assert_eq!(source, "contract"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
