// SPDX-License-Identifier: Apache-2.0

use super::handlers::{
    bad_request_response, error_response, finish, propagated_request_id,
};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use custodian_model::{Owner, OwnerPatch};
use serde::Deserialize;
use std::time::Instant;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteParams {
    #[serde(default)]
    pub(crate) jira_issue: Option<String>,
}

pub(crate) async fn list_owners_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owners";
    let response = match state.owners.list().await {
        Ok(owners) => Json(owners).into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn get_owner_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alias): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owners/{alias}";
    let response = match state.owners.get(&alias).await {
        Ok(owner) => Json(owner).into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn create_owner_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Owner>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owners";
    let response = match payload {
        Ok(Json(owner)) => match state.owners.create(owner).await {
            Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn update_owner_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alias): Path<String>,
    payload: Result<Json<Owner>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owners/{alias}";
    let response = match payload {
        Ok(Json(owner)) => match state.owners.update(&alias, owner).await {
            Ok(updated) => Json(updated).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn patch_owner_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alias): Path<String>,
    payload: Result<Json<OwnerPatch>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owners/{alias}";
    let response = match payload {
        Ok(Json(patch)) => match state.owners.patch(&alias, patch).await {
            Ok(updated) => Json(updated).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn delete_owner_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alias): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/owners/{alias}";
    let jira = params.jira_issue.unwrap_or_default();
    let response = match state.owners.delete(&alias, &jira).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}
