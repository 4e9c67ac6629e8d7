//! Local agent: newline-delimited JSON requests on stdin, responses on stdout.
//! Logs go to stderr so they never interleave with protocol output.

use anyhow::Context;
use scanpilot::config::AppConfig;
use scanpilot::pipe::serve_lines;
use scanpilot::services::dispatcher::Dispatcher;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "scanpilot=info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        engine = %config.scanner.binary.display(),
        templates_root = %config.scanner.templates_root.display(),
        "Local agent ready"
    );

    let dispatcher = Dispatcher::from_config(&config);
    let answered = serve_lines(
        &dispatcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
    .context("Local transport failed")?;

    tracing::info!(answered, "Local agent exiting");
    Ok(())
}
