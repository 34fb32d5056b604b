pub(crate) mod audit;
pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use router::build_api_router;

use crate::core::config::GatewayConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::Store;
use crate::skills::SkillRegistry;

#[derive(Clone)]
pub struct AppState {
    pub(crate) store: Store,
    pub(crate) registry: SkillRegistry,
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) diagnostics: Diagnostics,
}

impl AppState {
    pub fn new(store: Store, config: GatewayConfig, diagnostics: Diagnostics) -> Self {
        let registry = SkillRegistry::new(store.clone(), diagnostics.clone());
        Self {
            store,
            registry,
            config: Arc::new(config),
            diagnostics,
        }
    }

    /// Seeded in-memory store with default config.
    #[cfg(test)]
    pub(crate) async fn for_tests() -> Self {
        Self::for_tests_with(GatewayConfig::default()).await
    }

    #[cfg(test)]
    pub(crate) async fn for_tests_with(config: GatewayConfig) -> Self {
        let store = Store::open_in_memory().unwrap();
        store.seed_default_skills().await.unwrap();
        Self::new(store, config, Diagnostics::default())
    }
}

/// Serves the gateway router until shut down.
pub struct ApiServer {
    state: AppState,
    host: String,
    port: u16,
    shutdown: CancellationToken,
    local_addr: Option<SocketAddr>,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(state: AppState, host: String, port: u16) -> Self {
        Self {
            state,
            host,
            port,
            shutdown: CancellationToken::new(),
            local_addr: None,
            handle: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    fn name(&self) -> &str {
        "api"
    }

    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding API server to {}", addr))?;
        self.local_addr = listener.local_addr().ok();
        info!("API Server running at http://{}", addr);

        let app = build_api_router(self.state.clone());
        let shutdown = self.shutdown.clone();
        self.handle = Some(tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
            if let Err(e) = served {
                error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}
