use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::config::GatewayConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::lifecycle::LifecycleManager;
use crate::core::store::Store;
use crate::core::terminal::{self, GuideSection, print_link, print_status, print_warn};
use crate::interfaces::web::{ApiServer, AppState};
use crate::logging;

pub async fn run_serve(config: GatewayConfig, api_host: String, api_port: u16) -> Result<()> {
    logging::init_tracing(&config.logging)?;

    let store = Store::open(config.database_path()).await?;
    let seeded = store.seed_default_skills().await?;
    if seeded > 0 {
        info!("Installed {} default skill(s)", seeded);
    }

    let signed = config.webhook_secret().is_some();
    let unsigned_ok = config.webhooks.allow_unsigned;
    let diagnostics = Diagnostics::default();
    let state = AppState::new(store, config, diagnostics);

    let server = Arc::new(Mutex::new(ApiServer::new(state, api_host.clone(), api_port)));
    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(server);
    lifecycle.start().await?;

    terminal::print_banner();
    print_link("API", &format!("http://{}:{}/api/health", api_host, api_port));
    print_status(
        "Webhooks",
        if signed {
            "HMAC signature required"
        } else if unsigned_ok {
            "unsigned callbacks accepted"
        } else {
            "rejected until a secret is configured"
        },
    );
    if !signed && unsigned_ok {
        print_warn("Unsigned webhooks are accepted. Set [webhooks] secret before exposing the gateway.");
    }
    GuideSection::new("Next steps")
        .command("openclaw-gateway token create <name>", "Issue a token for n8n")
        .command("Ctrl+C", "Stop the gateway")
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}
