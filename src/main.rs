//! Gateway HTTP entrypoint.
//!
//! Launches the Axum-based server that fronts the paid agent API:
//!
//! - `GET /health` – Liveness and build identity
//! - `GET /api/v1/stats` – Usage summary and price table
//! - `POST /api/v1/{agent}` – Payment-gated agent dispatch
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `CONFIG` (or `--config`) names the JSON configuration file
//! - `RUST_LOG` controls log verbosity

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use x402_gateway::agents::{AgentRegistry, CompletionsClient};
use x402_gateway::challenge::ChallengeGenerator;
use x402_gateway::config::Config;
use x402_gateway::gateway::Gateway;
use x402_gateway::handlers;
use x402_gateway::ledger::JsonlLedger;
use x402_gateway::pricing::PriceRegistry;
use x402_gateway::util::{SigDown, Telemetry};

/// Initializes the gateway server.
///
/// - Loads `.env` variables.
/// - Installs the tracing subscriber.
/// - Opens the payment ledger (replaying its append-only log).
/// - Starts an Axum HTTP server with the gateway handlers.
///
/// Binds to the address specified by the `HOST` and `PORT` env vars.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let ledger = Arc::new(JsonlLedger::open(config.ledger_path())?);
    let upstream = CompletionsClient::new(
        config.upstream().base_url.clone(),
        config.upstream().api_key.inner().clone(),
    );
    let agents = AgentRegistry::builtin(upstream, config.handler_timeout());
    let challenges = ChallengeGenerator::new(
        config.receiving_address().to_string(),
        config.network().to_string(),
        config.asset_contract().to_string(),
    );
    let gateway = Gateway::new(
        ledger,
        PriceRegistry::builtin(),
        agents,
        challenges,
        config.validity_window(),
    );
    let axum_state = Arc::new(gateway);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
