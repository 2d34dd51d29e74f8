use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::controller::SharedController;
use crate::error::FieldError;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: SharedController) -> Router {
    Router::new()
        .route("/getValue", get(get_value))
        .route("/setValue", get(set_value))
        .route("/api/status", get(api_status))
        .with_state(state)
}

#[derive(Deserialize)]
struct GetParams {
    field: String,
}

#[derive(Deserialize)]
struct SetParams {
    field: String,
    value: String,
}

impl IntoResponse for FieldError {
    fn into_response(self) -> Response {
        let status = match self {
            FieldError::NotFound(_) => StatusCode::NOT_FOUND,
            FieldError::Validation(_) => StatusCode::BAD_REQUEST,
            FieldError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

async fn get_value(
    State(state): State<SharedController>,
    Query(q): Query<GetParams>,
) -> Result<String, FieldError> {
    let ctl = state.lock().await;
    ctl.get_value(&q.field)
}

async fn set_value(
    State(state): State<SharedController>,
    Query(q): Query<SetParams>,
) -> Result<&'static str, FieldError> {
    let mut ctl = state.lock().await;
    ctl.set_value(&q.field, &q.value)?;
    Ok("OK")
}

async fn api_status(State(state): State<SharedController>) -> impl IntoResponse {
    let ctl = state.lock().await;
    Json(ctl.status())
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: SharedController, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    tracing::info!(%addr, "field api listening");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
