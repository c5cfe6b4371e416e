use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden_server::infra::app_state::AppState;
use warden_server::infra::config::Config;
use warden_server::infra::startup::spawn_dev_otp_cleanup;
use warden_server::routes;

/// CLI overrides for the handful of settings worth flipping without
/// editing the environment (§6.3).
#[derive(Debug, Parser)]
#[command(name = "warden-server", version, about = "Zero-trust identity and session control plane")]
struct Args {
    /// Overrides WARDEN_ADDR.
    #[arg(long, env = "WARDEN_ADDR")]
    addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    let addr = config.addr;

    let state = AppState::build(config).await.context("building application state")?;
    spawn_dev_otp_cleanup(state.clone());

    let app = Router::new()
        .route("/ping", get(|| async { "pong" }))
        .merge(routes::create_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(%addr, "starting warden-server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
