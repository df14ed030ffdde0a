// SwapGate: OAuth redirect flow
// authorize → (provider consent) → callback → redirect to the app with the
// assembled auth payload. Issued `state` values are held server-side and
// redeemed once; refresh is proxied so clients never see the client secret.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::config::OAuthConfig;
use crate::handlers::ApiError;
use crate::ids::{now_millis, random_base36};
use crate::models::{AuthPayload, AuthorizeRequest, AuthorizeResponse, RefreshRequest, TokenPair, User};
use crate::state::AppState;

const STATE_PREFIX: &str = "oauth_";
const DEFAULT_PROVIDER: &str = "default";
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

// ── Pending state store ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PendingAuth {
    pub module: String,
    pub redirect_uri: String,
    pub issued_at: Instant,
}

/// `state` values handed out by authorize and not yet redeemed.
#[derive(Debug)]
pub struct PendingAuthStore {
    entries: Mutex<HashMap<String, PendingAuth>>,
    ttl: Duration,
}

impl PendingAuthStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingAuth>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn issue(&self, state: &str, module: &str, redirect_uri: &str) {
        self.entries().insert(
            state.to_string(),
            PendingAuth {
                module: module.to_string(),
                redirect_uri: redirect_uri.to_string(),
                issued_at: Instant::now(),
            },
        );
    }

    /// Removes and returns the entry. Expired entries are removed too but
    /// yield `None`, so a state can never be redeemed twice.
    pub fn consume(&self, state: &str) -> Option<PendingAuth> {
        let entry = self.entries().remove(state)?;
        if entry.issued_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry)
    }

    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.issued_at.elapsed() <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

// ── State token format ──────────────────────────────────────────────────
// oauth_{module}_{millis}_{9 x base36}. Parsed from the right so module ids
// may contain underscores.

pub fn mint_state(module: &str) -> String {
    format!("{}{}_{}_{}", STATE_PREFIX, module, now_millis(), random_base36(9))
}

pub fn parse_state_module(state: &str) -> Option<String> {
    let rest = state.strip_prefix(STATE_PREFIX)?;
    let mut parts = rest.rsplitn(3, '_');
    let nonce = parts.next()?;
    let millis = parts.next()?;
    let module = parts.next()?;
    if nonce.is_empty() || module.is_empty() || millis.parse::<i64>().is_err() {
        return None;
    }
    Some(module.to_string())
}

// ── Provider wire types ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Token exchange failed: HTTP {0}")]
    TokenRejected(u16),

    #[error("Failed to fetch user info: HTTP {0}")]
    UserInfoRejected(u16),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct ProviderTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl ProviderTokenResponse {
    fn into_pair(self, previous_refresh: Option<&str>) -> TokenPair {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        TokenPair {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string))
                .unwrap_or_default(),
            expires_at: now_millis() + expires_in * 1000,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ProviderUserInfo {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    wallet_address: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
}

impl ProviderUserInfo {
    fn into_user(self) -> (User, Vec<String>) {
        let id = match self.id {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let user = User {
            id,
            email: self.email.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            avatar: self.picture,
            wallet_address: self.wallet_address,
        };
        (user, self.permissions)
    }
}

// ── Provider calls ──────────────────────────────────────────────────────

async fn exchange_code(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenPair, ProviderError> {
    let resp = client
        .post(oauth.token_url())
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .timeout(PROVIDER_TIMEOUT)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(ProviderError::TokenRejected(resp.status().as_u16()));
    }

    let body: ProviderTokenResponse = resp
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(body.into_pair(None))
}

async fn fetch_user(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    access_token: &str,
) -> Result<(User, Vec<String>), ProviderError> {
    let resp = client
        .get(oauth.userinfo_url())
        .bearer_auth(access_token)
        .timeout(PROVIDER_TIMEOUT)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(ProviderError::UserInfoRejected(resp.status().as_u16()));
    }

    let info: ProviderUserInfo = resp
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(info.into_user())
}

pub async fn refresh_tokens(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    refresh_token: &str,
) -> Result<TokenPair, ProviderError> {
    let resp = client
        .post(oauth.token_url())
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .timeout(PROVIDER_TIMEOUT)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(ProviderError::TokenRejected(resp.status().as_u16()));
    }

    let body: ProviderTokenResponse = resp
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(body.into_pair(Some(refresh_token)))
}

// ═══════════════════════════════════════════════════════════════════════
//  Handlers
// ═══════════════════════════════════════════════════════════════════════

/// POST /api/oauth/authorize
pub async fn oauth_authorize(
    State(state): State<AppState>,
    Json(body): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let module = body
        .module
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Module name is required".to_string()))?;
    let provider = body
        .provider
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROVIDER);
    let oauth = &state.config.oauth;
    let redirect_uri = body
        .redirect_uri
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(&oauth.redirect_uri);

    let oauth_state = mint_state(module);

    let mut auth_url = url::Url::parse(&oauth.authorize_url())
        .map_err(|e| ApiError::Internal(format!("Invalid OAUTH_PROVIDER_URL: {}", e)))?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", &oauth.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &format!("module:{} read:wallet write:transaction", module))
        .append_pair("state", &oauth_state)
        .append_pair("provider", provider);

    state.oauth_states.issue(&oauth_state, module, redirect_uri);
    tracing::info!(module = %module, provider = %provider, "OAuth authorization started");

    Ok(Json(AuthorizeResponse {
        auth_url: auth_url.to_string(),
        state: oauth_state,
    }))
}

/// Query params the provider sends back.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn app_redirect(state: &AppState, pairs: &[(&str, &str)]) -> Redirect {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    Redirect::temporary(&format!("{}?{}", state.config.app_redirect_path, query))
}

/// GET /api/oauth/callback: always answers with a redirect into the app.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        tracing::warn!("OAuth provider returned error: {}", error);
        return app_redirect(&state, &[("error", &error)]);
    }

    let (code, oauth_state) = match (params.code, params.state) {
        (Some(c), Some(s)) if !c.is_empty() && !s.is_empty() => (c, s),
        _ => return app_redirect(&state, &[("error", "missing_parameters")]),
    };

    if parse_state_module(&oauth_state).is_none() {
        tracing::warn!("OAuth callback with malformed state");
        return app_redirect(&state, &[("error", "invalid_state")]);
    }

    let Some(pending) = state.oauth_states.consume(&oauth_state) else {
        tracing::warn!("OAuth callback with unknown, replayed or expired state");
        return app_redirect(&state, &[("error", "invalid_state")]);
    };

    match complete_login(&state, &code, &pending).await {
        Ok(payload) => match serde_json::to_string(&payload) {
            Ok(auth_data) => {
                tracing::info!(module = %payload.module, user = %payload.user.id, "OAuth login completed");
                app_redirect(&state, &[("auth_success", "true"), ("auth_data", &auth_data)])
            }
            Err(e) => {
                tracing::error!("Failed to serialize auth payload: {}", e);
                app_redirect(&state, &[("error", "callback_failed"), ("message", "Unknown error")])
            }
        },
        Err(e) => {
            tracing::error!(module = %pending.module, "OAuth callback failed: {}", e);
            app_redirect(&state, &[("error", "callback_failed"), ("message", &e.to_string())])
        }
    }
}

async fn complete_login(
    state: &AppState,
    code: &str,
    pending: &PendingAuth,
) -> Result<AuthPayload, ProviderError> {
    let oauth = &state.config.oauth;
    let tokens = exchange_code(&state.client, oauth, code, &pending.redirect_uri).await?;
    let (user, permissions) = fetch_user(&state.client, oauth, &tokens.access_token).await?;
    Ok(AuthPayload {
        user,
        tokens,
        module: pending.module.clone(),
        permissions,
    })
}

/// POST /api/oauth/refresh
pub async fn oauth_refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let refresh_token = body
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Refresh token is required".to_string()))?;

    match refresh_tokens(&state.client, &state.config.oauth, &refresh_token).await {
        Ok(pair) => Ok(Json(pair)),
        Err(ProviderError::TokenRejected(status)) if status == 400 || status == 401 => Err(
            ApiError::Unauthorized("Refresh token rejected by provider".to_string()),
        ),
        Err(e) => Err(ApiError::Upstream(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_module() {
        let s = mint_state("swap");
        assert!(s.starts_with("oauth_swap_"));
        assert_eq!(parse_state_module(&s).as_deref(), Some("swap"));

        let s = mint_state("liquidity_pool");
        assert_eq!(parse_state_module(&s).as_deref(), Some("liquidity_pool"));
    }

    #[test]
    fn malformed_states_are_rejected() {
        assert_eq!(parse_state_module("swap_123_abc"), None);
        assert_eq!(parse_state_module("oauth_"), None);
        assert_eq!(parse_state_module("oauth_swap"), None);
        assert_eq!(parse_state_module("oauth_swap_notanumber_abc"), None);
        assert_eq!(parse_state_module("oauth__123_abc"), None);
    }

    #[test]
    fn pending_state_is_single_use() {
        let store = PendingAuthStore::new(Duration::from_secs(60));
        store.issue("oauth_swap_1_a", "swap", "http://localhost/cb");
        let entry = store.consume("oauth_swap_1_a").unwrap();
        assert_eq!(entry.module, "swap");
        assert_eq!(entry.redirect_uri, "http://localhost/cb");
        assert!(store.consume("oauth_swap_1_a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn expired_state_is_dropped() {
        let store = PendingAuthStore::new(Duration::ZERO);
        store.issue("s1", "swap", "cb");
        store.issue("s2", "nft", "cb");
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.consume("s1").is_none());
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn numeric_user_id_is_stringified() {
        let info: ProviderUserInfo = serde_json::from_value(serde_json::json!({
            "id": 42,
            "email": "a@b.c",
            "name": "Ann",
            "picture": "http://img",
            "permissions": ["swap:execute"]
        }))
        .unwrap();
        let (user, perms) = info.into_user();
        assert_eq!(user.id, "42");
        assert_eq!(user.avatar.as_deref(), Some("http://img"));
        assert_eq!(perms, vec!["swap:execute"]);
    }

    #[test]
    fn token_response_defaults() {
        let before = now_millis();
        let resp: ProviderTokenResponse =
            serde_json::from_value(serde_json::json!({ "access_token": "at" })).unwrap();
        let pair = resp.into_pair(Some("old_rt"));
        assert_eq!(pair.refresh_token, "old_rt");
        assert_eq!(pair.token_type, "Bearer");
        assert!(pair.expires_at >= before + DEFAULT_EXPIRES_IN_SECS * 1000);
    }
}
