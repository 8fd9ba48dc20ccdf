// SPDX-License-Identifier: Apache-2.0

use super::handlers::{finish, propagated_request_id};
use crate::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info};

/// Accepts an inbound source-control event and triggers a full update with
/// notifications on a detached task, so a disconnecting sender cannot
/// cancel the refresh. Always answers 204.
pub(crate) async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<axum::Json<Value>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let route = "/webhook";

    let updater = state.updater.clone();
    let update_timeout = state.config.webhook_update_timeout;
    let task_request_id = request_id.clone();
    tokio::spawn(async move {
        let update = async {
            let mut txn = updater.lock().await;
            txn.perform_full_update_with_notifications().await
        };
        match tokio::time::timeout(update_timeout, update).await {
            Ok(Ok(())) => info!(request_id = %task_request_id, "webhook-triggered update complete"),
            Ok(Err(e)) => error!(request_id = %task_request_id, error = %e, "webhook-triggered update failed"),
            Err(_) => error!(request_id = %task_request_id, "webhook-triggered update timed out"),
        }
    });

    // A pull-request revision in the payload additionally starts a
    // validation check run, when a runner is configured.
    if let (Some(runner), Some(axum::Json(payload))) = (&state.check_runner, &body) {
        if let Some((project, repository, sha)) = pull_request_coordinates(payload) {
            let runner = runner.clone();
            tokio::spawn(async move {
                if let Err(e) = runner.run(&project, &repository, &sha).await {
                    error!(error = %e, "pull-request check run failed");
                }
            });
        }
    }

    let response = StatusCode::NO_CONTENT.into_response();
    finish(&state, route, &request_id, started, response).await
}

fn string_at<'v>(payload: &'v Value, pointer: &str) -> Option<&'v str> {
    payload.pointer(pointer).and_then(Value::as_str)
}

fn pull_request_coordinates(payload: &Value) -> Option<(String, String, String)> {
    let sha = string_at(payload, "/pullRequest/fromRef/latestCommit")
        .or_else(|| string_at(payload, "/sha"))?;
    let project = string_at(payload, "/pullRequest/fromRef/repository/project/key")
        .or_else(|| string_at(payload, "/project"))?;
    let repository = string_at(payload, "/pullRequest/fromRef/repository/slug")
        .or_else(|| string_at(payload, "/repository"))?;
    Some((project.to_string(), repository.to_string(), sha.to_string()))
}
