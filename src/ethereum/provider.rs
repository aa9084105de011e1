use alloy::{
    providers::{ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::networks::{NetworkDescriptor, Networks};
use crate::error::{Result, SdkError};

pub type HttpProvider = RootProvider<Http<Client>>;

/// Lazily builds one read-only JSON-RPC provider per network and reuses it.
///
/// Construction does no I/O. The cache lock is never held across an await, so
/// two tasks racing on the first lookup for a network may both build a
/// provider; the later insert wins and both are equivalent.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    networks: Arc<Networks>,
    providers: Arc<Mutex<HashMap<String, HttpProvider>>>,
}

impl ProviderManager {
    pub fn new(networks: Arc<Networks>) -> Self {
        Self {
            networks,
            providers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn networks(&self) -> &Networks {
        &self.networks
    }

    pub fn network(&self, name: &str) -> Result<&NetworkDescriptor> {
        self.networks.require(name)
    }

    fn create_provider(descriptor: &NetworkDescriptor) -> Result<HttpProvider> {
        let url: reqwest::Url = descriptor.rpc_url.parse().map_err(|e| {
            SdkError::InvalidInput(format!(
                "Invalid RPC URL '{}' for network '{}': {}",
                descriptor.rpc_url, descriptor.name, e
            ))
        })?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    pub fn get_provider(&self, network: &str) -> Result<HttpProvider> {
        let descriptor = self.networks.require(network)?;

        if let Some(provider) = self
            .providers
            .lock()
            .ok()
            .and_then(|cache| cache.get(network).cloned())
        {
            return Ok(provider);
        }

        tracing::debug!("Creating provider for network '{}' at {}", network, descriptor.rpc_url);
        let provider = Self::create_provider(descriptor)?;
        if let Ok(mut cache) = self.providers.lock() {
            cache.insert(network.to_string(), provider.clone());
        }
        Ok(provider)
    }

    pub fn cached_networks(&self) -> Vec<String> {
        self.providers
            .lock()
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default()
    }
}
