// src/server/routes.rs

//! HTTP handlers: validate and deserialize the request, invoke the
//! decision engine (C4), and serialize its response. All decision logic
//! lives in `core`; this module is a thin external collaborator per the
//! engine's endpoint-agnostic `decide(request, mode)` entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tracing::{debug, warn};

use crate::core::context::EngineContext;
use crate::core::engine::{self, generate_request_id};
use crate::core::errors::EngineError;
use crate::core::types::{Mode, Request, Response};

pub fn router(ctx: Arc<EngineContext>) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/v1/request/restart/os", post(restart_handler))
        .route("/v1/request/restart/", post(restart_handler))
        .route("/v1/inquire/restart/", post(inquire_handler))
        .with_state(ctx)
}

async fn health_handler() -> impl IntoResponse {
    let mut response = Response::base(generate_request_id(), String::new(), String::new());
    response.unknown_host = true;
    response.message = "HealthHandler!".to_string();
    Json(response)
}

async fn restart_handler(
    State(ctx): State<Arc<EngineContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<Request>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    decide_and_respond(ctx, addr, payload, Mode::Request).await
}

async fn inquire_handler(
    State(ctx): State<Arc<EngineContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<Request>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    decide_and_respond(ctx, addr, payload, Mode::Inquire).await
}

async fn decide_and_respond(
    ctx: Arc<EngineContext>,
    addr: SocketAddr,
    payload: Result<Json<Request>, axum::extract::rejection::JsonRejection>,
    mode: Mode,
) -> axum::response::Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(_) => return bad_request("Invalid request payload"),
    };

    debug!(ip = %addr.ip(), fqdn = %request.fqdn, ?mode, "incoming decision request");

    match engine::decide(&ctx, request, mode).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(EngineError::BadRequest(message)) => {
            warn!(%message, "rejected malformed request");
            bad_request(&message)
        }
        Err(other) => {
            warn!(error = %other, "engine error handling decision request");
            bad_request(&other.to_string())
        }
    }
}

fn bad_request(message: &str) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
