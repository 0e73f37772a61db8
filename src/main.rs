//! Caatuu · Proficiency Test Service
//!
//! - Axum HTTP API for adaptive, multi-phase HSK placement tests
//! - Admin endpoints to author, validate and activate branching configs
//! - Built-in default config and seed vocabulary, extendable via TOML
//!
//! Important env variables:
//!   PORT                     : u16 (default 3000)
//!   PROFICIENCY_CONFIG_PATH  : path to TOML config (settings, configs, questions, rewards)
//!   LOG_LEVEL                : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT               : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod evaluator;
mod validator;
mod bank;
mod session;
mod repository;
mod results;
mod seeds;
mod config;
mod state;
mod protocol;
mod logic;
mod routes;
mod pinyin;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "caatuu_proficiency", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "caatuu_proficiency", "Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config repository, question bank, sessions).
  let state = Arc::new(AppState::new().await);

  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "caatuu_proficiency", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}
