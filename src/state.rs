// Application state: every registry is constructed here once and shared by
// handle with all handlers and background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use crate::config::AppConfig;
use crate::mcp::client::McpServiceManager;
use crate::mcp::config::register_default_services;
use crate::modules::builtin::register_builtin_modules;
use crate::modules::loader::load_modules;
use crate::modules::ModuleRegistry;
use crate::oauth::PendingAuthStore;

/// Central application state. Clone-friendly; all shared parts are `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<McpServiceManager>,
    pub modules: Arc<ModuleRegistry>,
    /// Issued-but-unredeemed OAuth `state` values.
    pub oauth_states: Arc<PendingAuthStore>,
    pub client: Client,
    pub start_time: Instant,
    /// `true` once bootstrap has finished.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("Backend marked as READY");
    }
}

impl AppState {
    /// Empty registries around `config`. Nothing is registered.
    pub fn bare(config: AppConfig) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build tuned HTTP client ({}), using defaults", e);
                Client::new()
            });

        let oauth_states = PendingAuthStore::new(config.oauth.state_ttl);

        Self {
            services: Arc::new(McpServiceManager::new(client.clone())),
            modules: Arc::new(ModuleRegistry::new()),
            oauth_states: Arc::new(oauth_states),
            client,
            config: Arc::new(config),
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bootstrap in a fixed order: default services, built-in modules, then
    /// any descriptors found in `MODULES_DIR`.
    pub fn new(config: AppConfig) -> Self {
        let state = Self::bare(config);

        register_default_services(&state.services, &state.config.upstream_url);
        register_builtin_modules(&state.modules);
        if let Some(dir) = state.config.modules_dir.as_deref() {
            let loaded = load_modules(&state.modules, dir);
            tracing::info!("Loaded {} module descriptor(s) from {}", loaded, dir.display());
        }

        tracing::info!(
            "AppState initialised: {} services, {} modules",
            state.services.service_count(),
            state.modules.len()
        );
        state
    }
}
