//! Pania terminal client

use pania::cli;
use pania::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pania=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        model = %config.model,
        signed_in = config.user_id.is_some(),
        call_timeout_secs = config.call_timeout.as_secs(),
        "Configuration loaded"
    );

    cli::run(config).await?;
    Ok(())
}
