//! Webhook HTTP surface.
//!
//! Telegram redelivers an update whenever the webhook answers with a failure,
//! so every request to the webhook path is acknowledged with `{"ok": true}`,
//! including malformed or oversized bodies and handler panics.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::bot::AppState;
use crate::config::ServerConfig;
use crate::platform::Update;

#[derive(Debug, Serialize)]
pub struct Ack {
    ok: bool,
}

impl Ack {
    fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(webhook))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Json<Ack> {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Ignoring unreadable update body: {}", e);
            return Ack::ok();
        }
    };

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Ignoring malformed update ({} bytes): {}", body.len(), e);
            return Ack::ok();
        }
    };

    // Run on its own task so a panic inside the handler still gets acknowledged.
    let task = tokio::spawn(async move { state.handle_update(&update).await });
    match task.await {
        Ok(report) => debug!(
            "Update for chat {:?} done: {} step(s), {} failed",
            report.chat_id,
            report.steps.len(),
            report.failures()
        ),
        Err(e) => error!("Webhook handler aborted: {}", e),
    }

    Ack::ok()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serve the webhook until Ctrl-C or SIGTERM.
pub async fn serve(state: Arc<AppState>, config: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    info!(
        "Listening on {} (webhook path {})",
        config.listen_addr, config.webhook_path
    );

    axum::serve(listener, router(state, &config.webhook_path))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Webhook server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
