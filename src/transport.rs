//! HTTP transport to the IDE backend.
//!
//! [`Transport`] owns the request policy (base URL, auth headers, timeout,
//! cache busting, error normalization). The actual I/O goes through an
//! [`HttpBackend`], which is `reqwest` in production and [`MockBackend`] in
//! tests.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SdkError};
use crate::types::{ConfigUpdate, SdkConfig};

const USER_AGENT: &str = concat!("contract-ide-sdk/", env!("CARGO_PKG_VERSION"));

/// Name of the cache-busting query parameter stamped on every request.
pub const CACHE_BUST_PARAM: &str = "_t";

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the base URL, as passed by the caller
    pub path: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Connection(String),
}

/// The I/O seam under [`Transport`].
#[async_trait]
pub trait HttpBackend: Send + Sync + std::fmt::Debug {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BackendError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BackendError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .query(&request.query)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Connection(e.to_string())
            }
        })?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Json { status: u16, body: Value },
    Fail(BackendError),
}

/// Scripted backend that records every request it receives.
///
/// Replies are queued per `(method, path)`; the last queued reply for a route
/// keeps answering once the queue is drained. Unscripted routes answer 404.
#[derive(Debug, Default)]
pub struct MockBackend {
    routes: Mutex<HashMap<(Method, String), VecDeque<MockReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, reply: MockReply) {
        if let Ok(mut routes) = self.routes.lock() {
            routes
                .entry((method, path.to_string()))
                .or_default()
                .push_back(reply);
        }
    }

    /// Answer `method path` with `status` and a JSON `body`.
    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, MockReply::Json { status, body });
        self
    }

    pub fn on_connection_error(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(
            method,
            path,
            MockReply::Fail(BackendError::Connection(message.to_string())),
        );
        self
    }

    /// Delay every reply, to exercise client-side timeouts.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.delay.lock() {
            *d = Some(delay);
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    fn next_reply(&self, method: &Method, path: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().ok()?;
        let queue = routes.get_mut(&(method.clone(), path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BackendError> {
        let reply = self.next_reply(&request.method, &request.path);
        let delay = self.delay.lock().ok().and_then(|d| *d);
        let description = format!("{} {}", request.method, request.path);

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(MockReply::Json { status, body }) => Ok(HttpResponse { status, body }),
            Some(MockReply::Fail(e)) => Err(e),
            None => Ok(HttpResponse {
                status: 404,
                body: json!({ "success": false, "error": format!("No mock for {}", description) }),
            }),
        }
    }
}

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout_ms: Option<u64>,
}

impl RequestOptions {
    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

#[derive(Debug, Clone)]
struct TransportSettings {
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

/// Backend client used by every SDK module.
#[derive(Debug, Clone)]
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    settings: Arc<RwLock<TransportSettings>>,
}

impl Transport {
    pub fn new(config: &SdkConfig) -> Self {
        Self::with_backend(config, Arc::new(ReqwestBackend::new()))
    }

    pub fn with_backend(config: &SdkConfig, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            backend,
            settings: Arc::new(RwLock::new(TransportSettings {
                base_url: config.api_url.clone(),
                api_key: config.api_key.clone(),
                timeout_ms: config.timeout_ms,
            })),
        }
    }

    fn snapshot(&self) -> TransportSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut TransportSettings)) {
        match self.settings.write() {
            Ok(mut settings) => apply(&mut settings),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }

    pub fn base_url(&self) -> String {
        self.snapshot().base_url
    }

    pub fn timeout_ms(&self) -> u64 {
        self.snapshot().timeout_ms
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        let base_url = base_url.into();
        self.update(|s| s.base_url = base_url);
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        self.update(|s| s.api_key = api_key);
    }

    pub fn set_timeout_ms(&self, timeout_ms: u64) {
        self.update(|s| s.timeout_ms = timeout_ms);
    }

    /// Apply the fields present in `update`; requests already in flight keep
    /// the settings they started with.
    pub fn apply_update(&self, update: &ConfigUpdate) {
        self.update(|s| {
            if let Some(api_url) = &update.api_url {
                s.base_url = api_url.clone();
            }
            if let Some(api_key) = &update.api_key {
                s.api_key = api_key.clone();
            }
            if let Some(timeout_ms) = update.timeout_ms {
                s.timeout_ms = timeout_ms;
            }
        });
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with(path, RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.send_json(Method::GET, path, None, options).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post_with(path, body, RequestOptions::default()).await
    }

    pub async fn post_with<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, Some(serde_json::to_value(body)?), options)
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.put_with(path, body, RequestOptions::default()).await
    }

    pub async fn put_with<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, Some(serde_json::to_value(body)?), options)
            .await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.patch_with(path, body, RequestOptions::default()).await
    }

    pub async fn patch_with<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PATCH, path, Some(serde_json::to_value(body)?), options)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.delete_with(path, RequestOptions::default()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.send_json(Method::DELETE, path, None, options).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self.send(method, path, body, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send one request and return the JSON body of a 2xx answer.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let settings = self.snapshot();
        let timeout_ms = options.timeout_ms.unwrap_or(settings.timeout_ms);

        let mut query = options.query;
        query.push((
            CACHE_BUST_PARAM.to_string(),
            Utc::now().timestamp_millis().to_string(),
        ));

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        if let Some(key) = &settings.api_key {
            headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
            headers.push(("X-API-Key".to_string(), key.clone()));
        }
        headers.extend(options.headers);

        let request = HttpRequest {
            method: method.clone(),
            path: path.to_string(),
            url: join_url(&settings.base_url, path),
            query,
            headers,
            body,
            timeout: Duration::from_millis(timeout_ms),
        };

        debug!("{} {}", method, request.url);

        let outcome = tokio::time::timeout(request.timeout, self.backend.execute(request)).await;
        let response = match outcome {
            Err(_) | Ok(Err(BackendError::Timeout)) => {
                warn!("{} {} timed out after {} ms", method, path, timeout_ms);
                return Err(SdkError::Timeout(timeout_ms));
            }
            Ok(Err(BackendError::Connection(e))) => {
                warn!("{} {} failed: {}", method, path, e);
                return Err(SdkError::RequestFailed(e));
            }
            Ok(Ok(response)) => response,
        };

        normalize_response(response)
    }
}

/// Deserialize `value[key]` when the backend wraps its payload as
/// `{success, <key>: ...}`, or `value` itself otherwise.
pub(crate) fn unwrap_field<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T> {
    let inner = match value.get_mut(key) {
        Some(inner) if inner.is_object() || inner.is_array() => inner.take(),
        _ => value,
    };
    Ok(serde_json::from_value(inner)?)
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn server_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn normalize_response(response: HttpResponse) -> Result<Value> {
    let HttpResponse { status, body } = response;
    match status {
        200..=299 => Ok(body),
        401 => Err(SdkError::Unauthorized(
            server_message(&body).unwrap_or_else(|| "Invalid or missing API key".to_string()),
        )),
        429 => Err(SdkError::RateLimited(
            server_message(&body).unwrap_or_else(|| "Too many requests".to_string()),
        )),
        400 if body.get("error").and_then(Value::as_str) == Some("Validation failed") => {
            Err(SdkError::Validation {
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Validation failed")
                    .to_string(),
                field: body.get("field").and_then(Value::as_str).map(str::to_string),
            })
        }
        _ => Err(SdkError::RequestFailed(
            server_message(&body)
                .unwrap_or_else(|| format!("Request failed with status {}", status)),
        )),
    }
}
