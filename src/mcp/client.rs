//! `McpServiceManager`: the single entry point for invoking registered
//! backend services.
//!
//! Every call goes through the same checks (registration, method whitelist,
//! in-flight dedup, fixed-window rate limit) and comes back as a
//! [`CallResponse`]. Failures are never raised to the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use super::config::ServiceDescriptor;
use super::rate_limit::{RateLimitSnapshot, RateLimiter};
use crate::ids;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How long an expired rate-limit counter is kept before pruning.
const IDLE_COUNTER_GRACE_MS: i64 = 10 * 60 * 1000;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Unsupported,
    RateLimited,
    Unauthorized,
    Timeout,
    TransportError,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("MCP service '{0}' is not registered")]
    ServiceNotFound(String),

    #[error("Method '{method}' is not supported by service '{service}'")]
    MethodNotSupported { service: String, method: String },

    #[error("Service '{0}' is receiving too many requests, try again later")]
    RateLimited(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP {status}: {reason}")]
    Transport { status: u16, reason: String },

    #[error("Request to upstream failed: {0}")]
    Network(String),

    #[error("{0}")]
    Unknown(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::ServiceNotFound(_) => ErrorKind::NotFound,
            GatewayError::MethodNotSupported { .. } => ErrorKind::Unsupported,
            GatewayError::RateLimited(_) => ErrorKind::RateLimited,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::Transport { .. } | GatewayError::Network(_) => ErrorKind::TransportError,
            GatewayError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

// ── Request / response ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct McpRequest {
    pub service: String,
    pub method: String,
    pub params: Value,
    pub module: Option<String>,
    pub timeout: Duration,
}

impl McpRequest {
    pub fn new(service: &str, method: &str, params: Value) -> Self {
        Self {
            service: service.to_string(),
            method: method.to_string(),
            params,
            module: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_module(mut self, module: Option<String>) -> Self {
        self.module = module;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Uniform result of a gateway call. `success == false` carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorKind>,
    pub timestamp: i64,
    pub request_id: String,
}

impl CallResponse {
    fn success(data: Value, request_id: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            timestamp: ids::now_millis(),
            request_id,
        }
    }

    fn failure(err: &GatewayError, request_id: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.kind()),
            timestamp: ids::now_millis(),
            request_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ServiceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_status: Option<RateLimitSnapshot>,
}

// ── In-flight dedup ─────────────────────────────────────────────────────────

type PendingCall = Shared<BoxFuture<'static, CallResponse>>;
type InFlightMap = Arc<Mutex<HashMap<String, PendingCall>>>;

/// Removes the dedup entry when the call task finishes, panics included.
struct InFlightGuard {
    map: InFlightMap,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(&self.key);
    }
}

/// Composite key of service, method and canonical params. `serde_json`
/// maps are ordered, so equal params always serialize identically.
pub fn dedup_key(service: &str, method: &str, params: &Value) -> String {
    format!("{}:{}:{}", service, method, params)
}

struct OutboundCall {
    url: String,
    version: String,
    request_id: String,
    params: Value,
    module: Option<String>,
    timeout: Duration,
}

// ── Manager ─────────────────────────────────────────────────────────────────

pub struct McpServiceManager {
    services: RwLock<HashMap<String, ServiceDescriptor>>,
    limiter: Mutex<RateLimiter>,
    in_flight: InFlightMap,
    client: Client,
}

impl McpServiceManager {
    pub fn new(client: Client) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            limiter: Mutex::new(RateLimiter::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            client,
        }
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Insert or overwrite a service by name.
    pub fn register_service(&self, descriptor: ServiceDescriptor) {
        tracing::info!(
            service = %descriptor.name,
            methods = descriptor.methods.len(),
            "MCP service registered"
        );
        let mut services = self.services.write().unwrap_or_else(|p| p.into_inner());
        services.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get_service(&self, name: &str) -> Option<ServiceDescriptor> {
        let services = self.services.read().unwrap_or_else(|p| p.into_inner());
        services.get(name).cloned()
    }

    pub fn service_count(&self) -> usize {
        self.services.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Remove a service and its rate-limit counter.
    pub fn unregister_service(&self, name: &str) {
        let removed = {
            let mut services = self.services.write().unwrap_or_else(|p| p.into_inner());
            services.remove(name).is_some()
        };
        self.limiter
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name);
        if removed {
            tracing::info!(service = %name, "MCP service unregistered");
        }
    }

    // ── Status ──────────────────────────────────────────────────────────

    pub fn get_service_status(&self, name: &str) -> ServiceStatus {
        let config = self.get_service(name);
        let rate_limit_status = config.as_ref().and_then(|svc| {
            let policy = svc.rate_limit.as_ref()?;
            let limiter = self.limiter.lock().unwrap_or_else(|p| p.into_inner());
            limiter.snapshot(name, policy)
        });
        ServiceStatus {
            registered: config.is_some(),
            config,
            rate_limit_status,
        }
    }

    pub fn all_services_status(&self) -> BTreeMap<String, ServiceStatus> {
        let names: Vec<String> = {
            let services = self.services.read().unwrap_or_else(|p| p.into_inner());
            services.keys().cloned().collect()
        };
        names
            .into_iter()
            .map(|name| {
                let status = self.get_service_status(&name);
                (name, status)
            })
            .collect()
    }

    /// Number of distinct calls currently on the wire.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn prune_idle_counters(&self, now: i64) -> usize {
        self.limiter
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .prune_idle(now, IDLE_COUNTER_GRACE_MS)
    }

    // ── Calls ───────────────────────────────────────────────────────────

    /// Invoke `request.method` on `request.service`. Concurrent calls with the
    /// same (service, method, params) share one upstream request and resolve
    /// to the same response.
    pub async fn call_service(&self, request: McpRequest) -> CallResponse {
        let request_id = ids::request_id();
        match self.dispatch(request, &request_id) {
            Ok(pending) => pending.await,
            Err(err) => {
                tracing::debug!(request_id = %request_id, "MCP call rejected: {}", err);
                CallResponse::failure(&err, request_id)
            }
        }
    }

    /// Fan out over `requests`; the output keeps input order and one failure
    /// does not affect the others.
    pub async fn call_services(&self, requests: Vec<McpRequest>) -> Vec<CallResponse> {
        future::join_all(requests.into_iter().map(|r| self.call_service(r))).await
    }

    /// All pre-flight checks, then either join an existing in-flight call or
    /// start a new one. Runs without suspending, so check-then-insert is
    /// atomic with respect to other callers.
    fn dispatch(&self, request: McpRequest, request_id: &str) -> Result<PendingCall, GatewayError> {
        let service = self
            .get_service(&request.service)
            .ok_or_else(|| GatewayError::ServiceNotFound(request.service.clone()))?;

        if !service.supports(&request.method) {
            return Err(GatewayError::MethodNotSupported {
                service: service.name.clone(),
                method: request.method.clone(),
            });
        }

        let key = dedup_key(&service.name, &request.method, &request.params);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(existing) = in_flight.get(&key) {
            tracing::debug!(service = %service.name, method = %request.method, "joining in-flight MCP call");
            return Ok(existing.clone());
        }

        if let Some(policy) = &service.rate_limit {
            let mut limiter = self.limiter.lock().unwrap_or_else(|p| p.into_inner());
            if !limiter.check_and_increment(&service.name, policy, ids::now_millis()) {
                tracing::warn!(service = %service.name, limit = policy.requests, "MCP rate limit reached");
                return Err(GatewayError::RateLimited(service.name.clone()));
            }
        }

        let call = OutboundCall {
            url: service.endpoint(&request.method),
            version: service.version.clone(),
            request_id: request_id.to_string(),
            params: request.params,
            module: request.module,
            timeout: request.timeout,
        };
        let guard = InFlightGuard {
            map: Arc::clone(&self.in_flight),
            key: key.clone(),
        };
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let request_id = call.request_id.clone();
            match execute_request(&client, &call).await {
                Ok(data) => CallResponse::success(data, request_id),
                Err(err) => {
                    tracing::error!(request_id = %request_id, url = %call.url, "MCP call failed: {}", err);
                    CallResponse::failure(&err, request_id)
                }
            }
        });

        let fallback_id = request_id.to_string();
        let pending = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    CallResponse::failure(&GatewayError::Unknown(format!("MCP call task aborted: {}", e)), fallback_id)
                })
            })
            .boxed()
            .shared();

        in_flight.insert(key, pending.clone());
        Ok(pending)
    }
}

// ── Transport ───────────────────────────────────────────────────────────────

async fn execute_request(client: &Client, call: &OutboundCall) -> Result<Value, GatewayError> {
    let body = json!({
        "params": call.params,
        "module": call.module,
        "requestId": call.request_id,
        "timestamp": ids::now_millis(),
    });

    let exchange = async {
        let response = client
            .post(&call.url)
            .header("X-Service-Version", &call.version)
            .header("X-Request-ID", &call.request_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Unknown(format!("Upstream returned invalid JSON: {}", e)))
    };

    let payload = tokio::time::timeout(call.timeout, exchange)
        .await
        .map_err(|_| GatewayError::Timeout(call.timeout.as_millis() as u64))??;

    Ok(unwrap_result(payload))
}

/// Upstreams answer `{ "result": ... }`; anything else is passed through.
fn unwrap_result(payload: Value) -> Value {
    match payload.get("result") {
        Some(result) if !result.is_null() => result.clone(),
        _ => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::RateLimitPolicy;

    #[test]
    fn dedup_key_is_independent_of_param_order() {
        let a: Value = serde_json::from_str(r#"{"from":"ETH","to":"USDC"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"to":"USDC","from":"ETH"}"#).unwrap();
        assert_eq!(dedup_key("swap", "getRates", &a), dedup_key("swap", "getRates", &b));
        assert_ne!(dedup_key("swap", "getRates", &a), dedup_key("swap", "getTokens", &a));
    }

    #[test]
    fn unwrap_result_prefers_result_field() {
        assert_eq!(unwrap_result(json!({"result": [1, 2]})), json!([1, 2]));
        assert_eq!(unwrap_result(json!({"tokens": []})), json!({"tokens": []}));
        assert_eq!(unwrap_result(json!({"result": null, "x": 1})), json!({"result": null, "x": 1}));
    }

    #[test]
    fn error_kinds_follow_taxonomy() {
        assert_eq!(GatewayError::ServiceNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(GatewayError::Network("refused".into()).kind(), ErrorKind::TransportError);
        assert_eq!(
            GatewayError::Transport { status: 502, reason: "Bad Gateway".into() }.to_string(),
            "HTTP 502: Bad Gateway"
        );
    }

    #[tokio::test]
    async fn unknown_service_fails_without_touching_the_network() {
        let manager = McpServiceManager::new(Client::new());
        let resp = manager
            .call_service(McpRequest::new("ghost", "anything", json!({})))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.code, Some(ErrorKind::NotFound));
        assert!(resp.error.unwrap().contains("ghost"));
        assert!(resp.request_id.starts_with("req_"));
        assert_eq!(manager.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn unregister_drops_descriptor_and_counter() {
        let manager = McpServiceManager::new(Client::new());
        manager.register_service(
            ServiceDescriptor::new("swap", "http://127.0.0.1:9", &["getTokens"])
                .with_rate_limit(RateLimitPolicy::per_minute(1)),
        );
        assert!(manager.get_service_status("swap").registered);
        manager.unregister_service("swap");
        let status = manager.get_service_status("swap");
        assert!(!status.registered);
        assert!(status.rate_limit_status.is_none());
        assert_eq!(manager.service_count(), 0);
    }
}
