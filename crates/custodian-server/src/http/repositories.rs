// SPDX-License-Identifier: Apache-2.0

use super::handlers::{
    bad_request_response, error_response, finish, propagated_request_id,
};
use super::owners::DeleteParams;
use crate::services::RepositoryFilters;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use custodian_model::{Repository, RepositoryPatch};
use std::time::Instant;

pub(crate) async fn list_repositories_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    filters: Result<Query<RepositoryFilters>, axum::extract::rejection::QueryRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/repositories";
    let response = match filters {
        Ok(Query(filters)) => match state.repositories.list(&filters).await {
            Ok(repositories) => Json(repositories).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn get_repository_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/repositories/{key}";
    let response = match state.repositories.get(&key).await {
        Ok(repository) => Json(repository).into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn create_repository_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Repository>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/repositories";
    let response = match payload {
        Ok(Json(repository)) => match state.repositories.create(repository).await {
            Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn update_repository_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    payload: Result<Json<Repository>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/repositories/{key}";
    let response = match payload {
        Ok(Json(repository)) => match state.repositories.update(&key, repository).await {
            Ok(updated) => Json(updated).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn patch_repository_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    payload: Result<Json<RepositoryPatch>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/repositories/{key}";
    let response = match payload {
        Ok(Json(patch)) => match state.repositories.patch(&key, patch).await {
            Ok(updated) => Json(updated).into_response(),
            Err(err) => error_response(&err),
        },
        Err(rejection) => bad_request_response(&rejection.body_text()),
    };
    finish(&state, route, &request_id, started, response).await
}

pub(crate) async fn delete_repository_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/rest/api/v1/repositories/{key}";
    let jira = params.jira_issue.unwrap_or_default();
    let response = match state.repositories.delete(&key, &jira).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    };
    finish(&state, route, &request_id, started, response).await
}
