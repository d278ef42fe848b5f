//! HTTP control surface (C8): a single `GET /start` endpoint, bound to
//! loopback, that (re)triggers a dialing run.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tracing::{error, info};

use crate::config::DialerConfig;
use crate::core::Dialer;
use crate::protocols::ari::AriClient;

#[derive(Serialize)]
struct StartResponse {
    status: &'static str,
    message: String,
}

pub fn router<A: AriClient + 'static>(dialer: Arc<Dialer<A>>) -> Router {
    Router::new()
        .route("/start", get(start_handler::<A>))
        .fallback(not_found)
        .with_state(dialer)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

async fn start_handler<A: AriClient + 'static>(
    State(dialer): State<Arc<Dialer<A>>>,
) -> impl IntoResponse {
    match handle_start(dialer).await {
        Ok((status, message)) => (
            status,
            Json(StartResponse {
                status: if status.is_success() { "ok" } else { "error" },
                message,
            }),
        ),
        Err(err) => {
            error!(error = %err, "/start failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StartResponse {
                    status: "error",
                    message: err.to_string(),
                }),
            )
        }
    }
}

async fn handle_start<A: AriClient + 'static>(
    dialer: Arc<Dialer<A>>,
) -> crate::Result<(StatusCode, String)> {
    let config = DialerConfig::load_from_env()?;
    dialer.reload_config(config.clone()).await;
    dialer.reset_persistence().await;

    std::fs::create_dir_all(&config.recordings_dir)?;

    if !dialer.has_started() {
        dialer.start().await?;
        info!("dialer run started via control surface");
        return Ok((StatusCode::CREATED, "Dialer started.".to_string()));
    }

    if dialer.is_idle().await {
        dialer.restart_run().await?;
        info!("dialer run restarted via control surface");
        return Ok((StatusCode::OK, "Dialer run restarted.".to_string()));
    }

    Ok((StatusCode::OK, "Dialer already running.".to_string()))
}
