// Single authoritative OAuth session.
//
// Anonymous → Authenticating → Authenticated, back to Anonymous on failure,
// logout, or failed refresh. Every change is published on a watch channel;
// persistence mirrors the state under the keys in `storage`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::storage::{
    SessionStorage, ALL_KEYS, CURRENT_MODULE_KEY, PERMISSIONS_KEY, TOKENS_KEY, USER_KEY,
};
use super::SessionError;
use crate::ids::now_millis;
use crate::models::{AuthPayload, TokenPair, User};

/// Refresh when the access token expires within this window.
pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);
pub const REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// Module assumed when a restored session has none recorded.
const FALLBACK_MODULE: &str = "swap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSession {
    pub status: AuthStatus,
    pub user: Option<User>,
    pub tokens: Option<TokenPair>,
    pub current_module: Option<String>,
    pub permissions: Vec<String>,
    pub error: Option<String>,
}

impl OAuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.status == AuthStatus::Authenticating
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }
}

/// Exchanges a refresh token for a new pair.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<TokenPair, SessionError>> + Send;
}

/// What `ingest_redirect` found in the callback redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    LoggedIn { module: String },
    Failed { error: String, message: Option<String> },
    /// The URL carried no auth parameters.
    Ignored,
}

pub struct SessionStore<S, R> {
    storage: S,
    refresher: R,
    tx: watch::Sender<OAuthSession>,
    /// Bumped whenever the session is replaced or torn down. A refresh only
    /// applies its result if the generation it started under is still current.
    generation: Mutex<u64>,
}

impl<S: SessionStorage, R: TokenRefresher> SessionStore<S, R> {
    pub fn new(storage: S, refresher: R) -> Self {
        let (tx, _) = watch::channel(OAuthSession::default());
        Self {
            storage,
            refresher,
            tx,
            generation: Mutex::new(0),
        }
    }

    pub fn state(&self) -> OAuthSession {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OAuthSession> {
        self.tx.subscribe()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ── persistence helpers ─────────────────────────────────────────────

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.storage.get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        self.storage.set(key, &serde_json::to_string(value)?)
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn current_generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Wipes storage and state. Caller holds the generation lock.
    fn reset(&self, generation: &mut u64) {
        *generation += 1;
        self.clear_storage();
        self.tx.send_replace(OAuthSession::default());
    }

    fn clear_storage(&self) {
        for key in ALL_KEYS {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, "Failed to clear session key: {}", e);
            }
        }
    }

    fn load_stored(&self) -> Result<Option<(TokenPair, User)>, SessionError> {
        let tokens = self.read_json::<TokenPair>(TOKENS_KEY)?;
        let user = self.read_json::<User>(USER_KEY)?;
        Ok(tokens.zip(user))
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    /// Restores a persisted session. Expired tokens are refreshed first; if
    /// that fails the stored session is wiped.
    pub async fn hydrate(&self) -> AuthStatus {
        let started = self.current_generation();
        let (tokens, user) = match self.load_stored() {
            Ok(Some(stored)) => stored,
            Ok(None) => return self.tx.borrow().status,
            Err(e) => {
                tracing::warn!("Discarding stored session: {}", e);
                let mut generation = self.lock_generation();
                self.reset(&mut generation);
                return AuthStatus::Anonymous;
            }
        };

        let tokens = if tokens.is_expired(now_millis()) {
            match self.refresh().await {
                Ok(fresh) => fresh,
                Err(_) => return self.tx.borrow().status,
            }
        } else {
            tokens
        };

        let module = self
            .storage
            .get(CURRENT_MODULE_KEY)
            .unwrap_or_else(|| FALLBACK_MODULE.to_string());
        let permissions = self
            .read_json::<Vec<String>>(PERMISSIONS_KEY)
            .ok()
            .flatten()
            .unwrap_or_default();

        let generation = self.lock_generation();
        if *generation != started {
            return self.tx.borrow().status;
        }
        tracing::info!(module = %module, user = %user.id, "Session restored");
        self.tx.send_replace(OAuthSession {
            status: AuthStatus::Authenticated,
            user: Some(user),
            tokens: Some(tokens),
            current_module: Some(module),
            permissions,
            error: None,
        });
        AuthStatus::Authenticated
    }

    pub fn begin_login(&self, module: &str) {
        tracing::info!(module, "Login started");
        self.tx.send_modify(|s| {
            s.status = AuthStatus::Authenticating;
            s.error = None;
        });
    }

    pub fn complete_login(&self, payload: AuthPayload) -> Result<(), SessionError> {
        let mut generation = self.lock_generation();
        *generation += 1;

        self.write_json(TOKENS_KEY, &payload.tokens)?;
        self.write_json(USER_KEY, &payload.user)?;
        self.storage.set(CURRENT_MODULE_KEY, &payload.module)?;
        self.write_json(PERMISSIONS_KEY, &payload.permissions)?;

        tracing::info!(module = %payload.module, user = %payload.user.id, "Login completed");
        self.tx.send_replace(OAuthSession {
            status: AuthStatus::Authenticated,
            user: Some(payload.user),
            tokens: Some(payload.tokens),
            current_module: Some(payload.module),
            permissions: payload.permissions,
            error: None,
        });
        Ok(())
    }

    pub fn fail_login(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Login failed: {}", message);
        let mut generation = self.lock_generation();
        *generation += 1;
        self.tx.send_modify(|s| {
            s.status = AuthStatus::Anonymous;
            s.user = None;
            s.tokens = None;
            s.error = Some(message);
        });
    }

    pub fn logout(&self) {
        let mut generation = self.lock_generation();
        self.reset(&mut generation);
        tracing::info!("Logged out");
    }

    /// Swaps the stored refresh token for a new pair. Any failure logs out.
    /// If the session is replaced or logged out while the exchange is in
    /// flight, the result is dropped and `SessionChanged` is returned.
    pub async fn refresh(&self) -> Result<TokenPair, SessionError> {
        let started = self.current_generation();
        let stored = match self.read_json::<TokenPair>(TOKENS_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Stored tokens unreadable: {}", e);
                None
            }
        };
        let current = stored.or_else(|| self.tx.borrow().tokens.clone());

        let Some(refresh_token) = current.map(|t| t.refresh_token).filter(|t| !t.is_empty()) else {
            self.logout();
            return Err(SessionError::NoRefreshToken);
        };

        let outcome = self.refresher.refresh(&refresh_token).await;

        let mut generation = self.lock_generation();
        if *generation != started {
            tracing::debug!("Session replaced during token refresh, result discarded");
            return Err(SessionError::SessionChanged);
        }
        match outcome {
            Ok(tokens) => {
                if let Err(e) = self.write_json(TOKENS_KEY, &tokens) {
                    tracing::warn!("Failed to persist refreshed tokens: {}", e);
                }
                let updated = tokens.clone();
                self.tx.send_modify(|s| {
                    s.tokens = Some(updated);
                    s.error = None;
                });
                tracing::debug!("Access token refreshed");
                Ok(tokens)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                self.reset(&mut generation);
                Err(e)
            }
        }
    }

    // ── module & permissions ────────────────────────────────────────────

    pub fn set_current_module(&self, module: &str) -> Result<(), SessionError> {
        let owned = module.to_string();
        self.tx.send_modify(|s| s.current_module = Some(owned));
        self.storage.set(CURRENT_MODULE_KEY, module)
    }

    pub fn set_permissions(&self, permissions: Vec<String>) -> Result<(), SessionError> {
        self.write_json(PERMISSIONS_KEY, &permissions)?;
        self.tx.send_modify(|s| s.permissions = permissions);
        Ok(())
    }

    pub fn check_permission(&self, permission: &str) -> bool {
        self.tx.borrow().permissions.iter().any(|p| p == permission)
    }

    pub fn module(&self, module_id: &str) -> ModuleView<'_, S, R> {
        ModuleView {
            store: self,
            module_id: module_id.to_string(),
        }
    }

    // ── redirect & refresh scheduling ───────────────────────────────────

    /// Applies the parameters of the callback redirect (`auth_success` and
    /// `auth_data`, or `error` and `message`) to the session.
    pub fn ingest_redirect(&self, redirect: &str) -> Result<RedirectOutcome, SessionError> {
        let parsed = url::Url::parse(redirect)
            .or_else(|_| url::Url::parse("http://localhost/").and_then(|base| base.join(redirect)))
            .map_err(|e| SessionError::InvalidRedirect(e.to_string()))?;
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            let message = params.get("message").cloned();
            self.fail_login(message.clone().unwrap_or_else(|| error.clone()));
            return Ok(RedirectOutcome::Failed {
                error: error.clone(),
                message,
            });
        }

        if params.get("auth_success").map(String::as_str) == Some("true") {
            let raw = params
                .get("auth_data")
                .ok_or_else(|| SessionError::InvalidRedirect("auth_data is missing".to_string()))?;
            let payload: AuthPayload = serde_json::from_str(raw)?;
            let module = payload.module.clone();
            self.complete_login(payload)?;
            return Ok(RedirectOutcome::LoggedIn { module });
        }

        Ok(RedirectOutcome::Ignored)
    }

    pub fn needs_refresh(&self, now: i64, threshold: Duration) -> bool {
        let window = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        let state = self.tx.borrow();
        state.is_authenticated() && state.tokens.as_ref().is_some_and(|t| t.expires_within(now, window))
    }
}

impl<S, R> SessionStore<S, R>
where
    S: SessionStorage + 'static,
    R: TokenRefresher + 'static,
{
    /// Checks every minute and refreshes when expiry is under five minutes away.
    pub fn spawn_refresh_loop(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.spawn_refresh_loop_every(REFRESH_CHECK_INTERVAL, cancel)
    }

    pub fn spawn_refresh_loop_every(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if store.needs_refresh(now_millis(), REFRESH_THRESHOLD) {
                    if let Err(e) = store.refresh().await {
                        tracing::warn!("Scheduled refresh failed: {}", e);
                    }
                }
            }
            tracing::debug!("Refresh loop stopped");
        })
    }
}

/// One module's view of the global session. Only the session's current
/// module counts as authenticated.
pub struct ModuleView<'a, S, R> {
    store: &'a SessionStore<S, R>,
    module_id: String,
}

impl<S: SessionStorage, R: TokenRefresher> ModuleView<'_, S, R> {
    pub fn is_authenticated(&self) -> bool {
        let state = self.store.tx.borrow();
        state.is_authenticated() && state.current_module.as_deref() == Some(self.module_id.as_str())
    }

    /// `{module}:{permission}` or the bare permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        let scoped = format!("{}:{}", self.module_id, permission);
        self.store
            .tx
            .borrow()
            .permissions
            .iter()
            .any(|p| *p == scoped || p == permission)
    }

    /// Logs out only if this module is the current one.
    pub fn logout(&self) -> bool {
        let is_current = self.store.tx.borrow().current_module.as_deref() == Some(self.module_id.as_str());
        if is_current {
            self.store.logout();
        }
        is_current
    }
}
