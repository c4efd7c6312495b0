use super::{AppState, SessionInfo};
use crate::control::{ControlCommand, ControlSnapshot};
use crate::relay::CountersSnapshot;
use crate::signaling::{parse_answer, SignalingState};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn ok_response() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub(super) async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        "Not found",
    )
        .into_response()
}

pub(super) async fn index(State(state): State<AppState>) -> Response {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(page) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            page,
        )
            .into_response(),
        Err(e) => {
            log::debug!("Viewer page {:?} unavailable: {}", path, e);
            not_found().await
        }
    }
}

pub(super) async fn offer(State(state): State<AppState>) -> Response {
    let coordinator = Arc::clone(&state.coordinator);
    let timeout = state.offer_timeout;

    match tokio::task::spawn_blocking(move || coordinator.await_offer(timeout)).await {
        Ok(Some(offer)) => Json(offer).into_response(),
        Ok(None) => error_response(StatusCode::SERVICE_UNAVAILABLE, "offer-not-ready"),
        Err(e) => {
            log::error!("Offer wait task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal-error")
        }
    }
}

pub(super) async fn answer(State(state): State<AppState>, body: Bytes) -> Response {
    let answer = match parse_answer(&body) {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Rejected answer body: {}", e);
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let coordinator = Arc::clone(&state.coordinator);
    match tokio::task::spawn_blocking(move || coordinator.submit_answer(answer)).await {
        Ok(Ok(())) => ok_response(),
        Ok(Err(e)) => {
            log::warn!("Answer not applied: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            log::error!("Answer task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal-error")
        }
    }
}

pub(super) async fn control(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<Value>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid-json");
    };

    match request.get("command").and_then(Value::as_str) {
        Some(command) => match ControlCommand::parse(command) {
            Some(command) => state.control.apply(command),
            None => log::debug!("Ignoring unknown control command {:?}", command),
        },
        None => log::debug!("Control request without a command: {}", request),
    }
    ok_response()
}

#[derive(Debug, Serialize)]
struct StatusReport {
    name: &'static str,
    version: &'static str,
    session: SessionInfo,
    control: ControlSnapshot,
    signaling: SignalingState,
    sink_open: bool,
    relay: CountersSnapshot,
}

pub(super) async fn status(State(state): State<AppState>) -> Response {
    Json(StatusReport {
        name: crate::NAME,
        version: crate::VERSION,
        session: state.session,
        control: state.control.snapshot(),
        signaling: state.coordinator.state(),
        sink_open: state.coordinator.transport().is_media_sink_open(),
        relay: state.counters.snapshot(),
    })
    .into_response()
}
