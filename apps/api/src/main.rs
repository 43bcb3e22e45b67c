use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use clinic_cell::{ClinicSeed, InMemoryCatalog, InMemoryStaffing};
use service_queue_cell::NoShowMonitor;
use shared_config::AppConfig;

use crate::router::ClinicServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic flow API server");

    let config = AppConfig::from_env();
    let seed = load_seed(&config).await?;
    let catalog = Arc::new(InMemoryCatalog::from_seed(&seed));
    let staffing = Arc::new(InMemoryStaffing::from_seed(&seed.staff));

    let services = ClinicServices::build(&config, catalog, staffing);

    let monitor = Arc::new(NoShowMonitor::new(services.dispatcher.clone()));
    let monitor_task = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.start().await })
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    monitor.shutdown().await;
    monitor_task.await.context("no-show monitor panicked")?;
    Ok(())
}

async fn load_seed(config: &AppConfig) -> anyhow::Result<ClinicSeed> {
    let Some(path) = config.clinic_seed_path.as_deref() else {
        return Ok(ClinicSeed::default());
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read clinic seed {}", path))?;
    let seed: ClinicSeed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid clinic seed {}", path))?;

    info!(
        "Loaded clinic seed: {} service(s), {} booth(s), {} staff",
        seed.services.len(),
        seed.booths.len(),
        seed.staff.len()
    );
    Ok(seed)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
