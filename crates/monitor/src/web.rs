use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rumqttc::{AsyncClient, QoS};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::mqtt::threshold_payload;
use crate::state::SharedState;

#[derive(Clone)]
pub struct WebState {
    pub shared: SharedState,
    pub client: AsyncClient,
    pub command_topic: String,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub threshold: i64,
}

#[derive(Debug, Serialize)]
struct ThresholdAccepted {
    threshold: u8,
    topic: String,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn error(status: StatusCode, msg: String) -> Response {
    (status, Json(ApiError { error: msg })).into_response()
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/threshold", post(api_threshold))
        .with_state(state)
}

async fn api_status(State(state): State<WebState>) -> impl IntoResponse {
    let st = state.shared.read().await;
    Json(st.to_status())
}

/// Publish a threshold command.  The controller does not acknowledge, so a
/// 202 only means the command was handed to the broker client.
async fn api_threshold(
    State(state): State<WebState>,
    Json(req): Json<ThresholdRequest>,
) -> Response {
    let payload = match threshold_payload(req.threshold) {
        Ok(p) => p,
        Err(msg) => return error(StatusCode::UNPROCESSABLE_ENTITY, msg),
    };

    if let Err(e) = state
        .client
        .try_publish(&state.command_topic, QoS::AtLeastOnce, false, payload)
    {
        warn!("threshold publish failed: {e}");
        let mut st = state.shared.write().await;
        st.record_error(format!("threshold publish failed: {e}"));
        return error(StatusCode::SERVICE_UNAVAILABLE, format!("publish failed: {e}"));
    }

    // In range (0, 100) by construction.
    let threshold = req.threshold as u8;
    info!(threshold, topic = %state.command_topic, "threshold command published");
    state.shared.write().await.record_command(threshold);

    (
        StatusCode::ACCEPTED,
        Json(ThresholdAccepted {
            threshold,
            topic: state.command_topic.clone(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: WebState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("web api listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
