//! Service descriptors for the call gateway and the default service table.

use serde::{Deserialize, Serialize};

use super::client::McpServiceManager;

/// Fixed-window ceiling for one service: at most `requests` calls per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests: u32,
    /// Window length in milliseconds.
    #[serde(rename = "window")]
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            window_ms: 60_000,
        }
    }
}

/// A named remote capability reachable through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    pub base_url: String,
    pub version: String,
    /// Whitelisted method names, in declaration order.
    pub methods: Vec<String>,
    pub auth_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, base_url: &str, methods: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            version: "1.0.0".to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            auth_required: false,
            rate_limit: None,
        }
    }

    pub fn with_auth(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn supports(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// `{base}/mcp/{service}/{method}`
    pub fn endpoint(&self, method: &str) -> String {
        format!("{}/mcp/{}/{}", self.base_url, self.name, method)
    }
}

/// The services every deployment starts with. All of them live behind the
/// same upstream base address.
pub fn default_services(upstream: &str) -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::new(
            "oauth",
            upstream,
            &["authorize", "callback", "refresh", "revoke", "getUserInfo"],
        )
        .with_rate_limit(RateLimitPolicy::per_minute(100)),
        ServiceDescriptor::new(
            "swap",
            upstream,
            &["getTokens", "getRates", "executeSwap", "getHistory"],
        )
        .with_auth(true)
        .with_rate_limit(RateLimitPolicy::per_minute(50)),
        ServiceDescriptor::new(
            "defi",
            upstream,
            &["getPools", "stake", "unstake", "claimRewards", "getPositions"],
        )
        .with_auth(true)
        .with_rate_limit(RateLimitPolicy::per_minute(30)),
        ServiceDescriptor::new(
            "nft",
            upstream,
            &["getCollections", "getTokens", "transfer", "mint", "getMetadata"],
        )
        .with_auth(true)
        .with_rate_limit(RateLimitPolicy::per_minute(20)),
    ]
}

/// Register the default table into `manager`, in declaration order.
pub fn register_default_services(manager: &McpServiceManager, upstream: &str) {
    for descriptor in default_services(upstream) {
        manager.register_service(descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_service_and_method() {
        let svc = ServiceDescriptor::new("swap", "http://upstream/api/", &["getTokens"]);
        assert_eq!(svc.endpoint("getTokens"), "http://upstream/api/mcp/swap/getTokens");
    }

    #[test]
    fn default_table_matches_expected_policies() {
        let services = default_services("http://x");
        let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["oauth", "swap", "defi", "nft"]);

        let oauth = &services[0];
        assert!(!oauth.auth_required);
        assert_eq!(oauth.rate_limit, Some(RateLimitPolicy::per_minute(100)));

        let nft = &services[3];
        assert!(nft.auth_required);
        assert!(nft.supports("mint"));
        assert!(!nft.supports("burn"));
        assert_eq!(nft.rate_limit.map(|p| p.requests), Some(20));
    }

    #[test]
    fn descriptor_serializes_with_wire_names() {
        let svc = ServiceDescriptor::new("defi", "http://x", &["stake"])
            .with_auth(true)
            .with_rate_limit(RateLimitPolicy::per_minute(30));
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json["baseUrl"], "http://x");
        assert_eq!(json["authRequired"], true);
        assert_eq!(json["rateLimit"]["requests"], 30);
        assert_eq!(json["rateLimit"]["window"], 60_000);
    }
}
