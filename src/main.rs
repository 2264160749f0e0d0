//! NFR Study · feedback collection backend
//!
//! - Axum HTTP API for the study flow (consent, tutorial, evaluation, survey, prize)
//! - Chatbot backed by an external coding-agent CLI
//! - Flat JSON documents under DATA_DIR, plus a password-gated admin dump/wipe
//!
//! Important env variables:
//!   PORT               : u16 (default 5000)
//!   STUDY_CONFIG_PATH  : path to TOML config (see `config`)
//!   DATA_DIR           : where response documents live (default "responses")
//!   ADMIN_PASSWORD     : enables /api/admin/* when set
//!   AGENT_BIN / AGENT_MODEL / AGENT_PROJECT_PATH / AGENT_LOGS_DIR : agent CLI overrides
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod agent;
mod allocator;
mod config;
mod domain;
mod error;
mod logic;
mod nfr;
mod protocol;
mod routes;
mod sessions;
mod state;
mod store;
mod telemetry;
mod timing;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::StudyConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = StudyConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

  // Shared state: catalog, document store, agent bridge, chat sessions.
  let state = Arc::new(AppState::new(cfg)?);
  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "nfr_study", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "nfr_study", "HTTP server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "nfr_study", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
}
