use std::net::SocketAddr;

use anyhow::Context;
use mimalloc::MiMalloc;
use scanpilot::routes::build_router;
use scanpilot::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanpilot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let state = AppState::from_env().context("Failed to load configuration")?;
    let config = state.config.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(
        host = %addr,
        engine = %config.scanner.binary.display(),
        templates_root = %config.scanner.templates_root.display(),
        oracle_configured = config.oracle.api_key.is_some(),
        "Starting scan agent"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
