use mimalloc::MiMalloc;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinema_booking::{app, config::Config, AppState};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.rust_log));
    if config.app.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(environment = %config.app.environment, "Starting cinema booking API");

    let app_state = AppState::new(config.clone()).await?;

    // --- Background tasks ---
    let interval = app_state.sweep_interval();
    app_state.sweeper().spawn(interval);
    info!(interval_secs = interval.as_secs(), "Expiry sweeper started");

    // --- Web server ---
    let router = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
