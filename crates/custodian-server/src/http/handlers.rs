// SPDX-License-Identifier: Apache-2.0

use crate::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use custodian_core::{Error, ErrorKind};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Instant;

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::Concurrency | ErrorKind::Referenced => {
            StatusCode::CONFLICT
        }
        ErrorKind::DownstreamUnavailable => StatusCode::BAD_GATEWAY,
        // An empty diff means the desired state is already in place.
        ErrorKind::NoChanges => StatusCode::OK,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        // `ErrorKind` is `#[non_exhaustive]`; map any future kind to 500.
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: &Error) -> Response {
    let status = status_for(err.kind());
    let mut body = json!({
        "error": {
            "kind": err.kind,
            "message": &err.message,
            "details": &err.details,
        }
    });
    if let Some(current) = &err.current {
        body["current"] = current.clone();
    }
    (status, Json(body)).into_response()
}

pub(crate) fn bad_request_response(message: &str) -> Response {
    error_response(&Error::bad_request(message))
}

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub(crate) async fn finish(
    state: &AppState,
    route: &'static str,
    request_id: &str,
    started: Instant,
    response: Response,
) -> Response {
    state
        .metrics
        .observe_request(route, response.status(), started.elapsed())
        .await;
    with_request_id(response, request_id)
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    with_request_id((StatusCode::OK, "ok").into_response(), &request_id)
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let response = if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response()
    };
    with_request_id(response, &request_id)
}

pub(crate) async fn version_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let payload = json!({
        "crate": crate::CRATE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "config_schema_version": crate::config::CONFIG_SCHEMA_VERSION,
    });
    let mut response = Json(payload).into_response();
    if let Ok(value) = HeaderValue::from_str("public, max-age=30") {
        response.headers_mut().insert("cache-control", value);
    }
    with_request_id(response, &request_id)
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let rendered = state.metrics.render().await;
    with_request_id((StatusCode::OK, rendered).into_response(), &request_id)
}

/// Aggregate join of every owner with its services and repositories.
pub(crate) async fn owned_resources_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owned-resources";

    let owners = match state.cache.all_owners().await {
        Ok(owners) => owners,
        Err(err) => {
            return finish(&state, route, &request_id, started, error_response(&err)).await
        }
    };
    let services = match state.cache.all_services().await {
        Ok(services) => services,
        Err(err) => {
            return finish(&state, route, &request_id, started, error_response(&err)).await
        }
    };
    let repositories = match state.cache.all_repositories().await {
        Ok(repositories) => repositories,
        Err(err) => {
            return finish(&state, route, &request_id, started, error_response(&err)).await
        }
    };

    let rows: Vec<serde_json::Value> = owners
        .into_iter()
        .map(|owner| {
            let owned_services: Vec<_> = services
                .iter()
                .filter(|s| s.owner == owner.alias)
                .collect();
            let owned_repositories: Vec<_> = repositories
                .iter()
                .filter(|r| r.owner == owner.alias)
                .collect();
            json!({
                "owner": owner,
                "services": owned_services,
                "repositories": owned_repositories,
            })
        })
        .collect();
    let response = Json(json!({ "owners": rows })).into_response();
    finish(&state, route, &request_id, started, response).await
}
