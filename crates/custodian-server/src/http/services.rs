// SPDX-License-Identifier: Apache-2.0

use super::handlers::{
    bad_request_response, error_response, finish, propagated_request_id,
};
use super::owners::DeleteParams;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use custodian_model::{Service, ServicePatch};
use serde_json::json;
use std::time::Instant;

pub(crate) async fn list_services_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services";
    let response = match state.services.list().await {
        Ok(services) => Json(services).into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn get_service_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services/{name}";
    let response = match state.services.get(&name).await {
        Ok(service) => Json(service).into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn create_service_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Service>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services";
    let response = match payload {
        Ok(Json(service)) => match state.services.create(service).await {
            Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn update_service_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    payload: Result<Json<Service>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services/{name}";
    let response = match payload {
        Ok(Json(service)) => match state.services.update(&name, service).await {
            Ok(updated) => Json(updated).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn patch_service_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    payload: Result<Json<ServicePatch>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services/{name}";
    let response = match payload {
        Ok(Json(patch)) => match state.services.patch(&name, patch).await {
            Ok(updated) => Json(updated).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn delete_service_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services/{name}";
    let jira = params.jira_issue.unwrap_or_default();
    let response = match state.services.delete(&name, &jira).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn service_promoters_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/services/{name}/promoters";
    let response = match state.services.promoters(&name).await {
        Ok(promoters) => Json(json!({ "promoters": promoters })).into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}
