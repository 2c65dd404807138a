use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tendril::config::AppConfig;
use tendril::server::{create_router, AppState};
use tendril::shutdown::{graceful_shutdown, wait_for_shutdown};

#[derive(Parser)]
#[command(
    name = "tendril",
    about = "Turns assigned GitHub issues and review feedback into pull requests"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Seconds to wait for an in-flight workflow on shutdown
    #[arg(long, default_value_t = 120)]
    shutdown_grace_secs: u64,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(cli.config.as_deref())?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        agent = %config.github.agent_login,
        "Starting tendril server"
    );

    let state = Arc::new(AppState::new(config.clone())?);

    let queue_state = Arc::clone(&state);
    let processor = tokio::spawn(async move {
        tendril::queue::run_queue_processor(queue_state).await;
    });

    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    if graceful_shutdown(&state, Duration::from_secs(cli.shutdown_grace_secs)).await {
        let _ = processor.await;
    } else {
        processor.abort();
    }

    Ok(())
}
