//! Client-side OAuth session.
//!
//! - `storage`: where the session is persisted between runs (memory or a JSON file).
//! - `store`: the single authoritative session state, published over a watch channel.
//! - `client`: HTTP client for this backend (authorize, refresh, MCP calls).

pub mod client;
pub mod storage;
pub mod store;

pub use client::BackendClient;
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use store::{AuthStatus, ModuleView, OAuthSession, RedirectOutcome, SessionStore, TokenRefresher};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("User is not authenticated")]
    NotAuthenticated,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Session changed while the token refresh was in flight")]
    SessionChanged,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Backend returned HTTP {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid redirect URL: {0}")]
    InvalidRedirect(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Session data is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}
