// Process configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

const DEMO_CLIENT_ID: &str = "demo_client";
const DEMO_CLIENT_SECRET: &str = "demo_secret";

/// External OAuth provider settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Base URL; `/authorize`, `/token` and `/userinfo` hang off it.
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Used when the authorize request does not name its own redirect URI.
    pub redirect_uri: String,
    /// How long an issued `state` stays redeemable.
    pub state_ttl: Duration,
}

impl OAuthConfig {
    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.provider_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.provider_url)
    }

    pub fn userinfo_url(&self) -> String {
        format!("{}/userinfo", self.provider_url)
    }

    /// True while the built-in demo credentials are in use.
    pub fn uses_demo_credentials(&self) -> bool {
        self.client_id == DEMO_CLIENT_ID || self.client_secret == DEMO_CLIENT_SECRET
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Base address of the default MCP services.
    pub upstream_url: String,
    pub oauth: OAuthConfig,
    /// Where the OAuth callback sends the browser back to.
    pub app_redirect_path: String,
    /// When set, module toggling requires `Authorization: Bearer <token>`.
    pub admin_token: Option<String>,
    pub modules_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let port = 8081;
        Self {
            port,
            upstream_url: "http://localhost:8082/api".to_string(),
            oauth: OAuthConfig {
                provider_url: "https://oauth.example.com".to_string(),
                client_id: DEMO_CLIENT_ID.to_string(),
                client_secret: DEMO_CLIENT_SECRET.to_string(),
                redirect_uri: format!("http://localhost:{}/api/oauth/callback", port),
                state_ttl: Duration::from_secs(600),
            },
            app_redirect_path: "/".to_string(),
            admin_token: None,
            modules_dir: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_nonempty("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let client_id = env_nonempty("OAUTH_CLIENT_ID").unwrap_or_else(|| DEMO_CLIENT_ID.to_string());
        let client_secret =
            env_nonempty("OAUTH_CLIENT_SECRET").unwrap_or_else(|| DEMO_CLIENT_SECRET.to_string());

        let oauth = OAuthConfig {
            provider_url: env_nonempty("OAUTH_PROVIDER_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.oauth.provider_url),
            client_id,
            client_secret,
            redirect_uri: env_nonempty("OAUTH_REDIRECT_URI")
                .unwrap_or_else(|| format!("http://localhost:{}/api/oauth/callback", port)),
            state_ttl: env_nonempty("OAUTH_STATE_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.oauth.state_ttl),
        };

        if oauth.uses_demo_credentials() {
            tracing::warn!(
                "OAUTH_CLIENT_ID / OAUTH_CLIENT_SECRET not set, using demo credentials, NOT suitable for production"
            );
        }

        let cors_origins = env_nonempty("CORS_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        Self {
            port,
            upstream_url: env_nonempty("MCP_UPSTREAM_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upstream_url),
            oauth,
            app_redirect_path: env_nonempty("APP_REDIRECT_PATH").unwrap_or(defaults.app_redirect_path),
            admin_token: env_nonempty("ADMIN_TOKEN"),
            modules_dir: env_nonempty("MODULES_DIR").map(PathBuf::from),
            cors_origins,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
