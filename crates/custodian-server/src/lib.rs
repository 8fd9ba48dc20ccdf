// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use custodian_checks::CheckRunner;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

pub mod cache;
pub mod config;
mod http;
pub mod mapper;
pub mod notify;
pub mod services;
mod telemetry;
pub mod trigger;
pub mod updater;

use cache::MetadataCache;
use config::RuntimeConfig;
use services::{OwnerService, RepositoryService, ServiceService};
use telemetry::RequestMetrics;
use updater::Updater;

pub const CRATE_NAME: &str = "custodian-server";

#[derive(Clone)]
pub struct AppState {
    pub owners: Arc<OwnerService>,
    pub services: Arc<ServiceService>,
    pub repositories: Arc<RepositoryService>,
    pub updater: Arc<Updater>,
    pub cache: Arc<MetadataCache>,
    pub config: Arc<RuntimeConfig>,
    pub check_runner: Option<Arc<CheckRunner>>,
    pub ready: Arc<AtomicBool>,
    pub accepting_requests: Arc<AtomicBool>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(
        updater: Arc<Updater>,
        cache: Arc<MetadataCache>,
        config: Arc<RuntimeConfig>,
        check_runner: Option<Arc<CheckRunner>>,
    ) -> Self {
        Self {
            owners: Arc::new(OwnerService::new(
                Arc::clone(&updater),
                Arc::clone(&cache),
                Arc::clone(&config),
            )),
            services: Arc::new(ServiceService::new(
                Arc::clone(&updater),
                Arc::clone(&cache),
                Arc::clone(&config),
            )),
            repositories: Arc::new(RepositoryService::new(
                Arc::clone(&updater),
                Arc::clone(&cache),
                Arc::clone(&config),
            )),
            updater,
            cache,
            config,
            check_runner,
            ready: Arc::new(AtomicBool::new(false)),
            accepting_requests: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/readyz", get(http::handlers::readyz_handler))
        .route("/metrics", get(http::handlers::metrics_handler))
        .route("/v1/version", get(http::handlers::version_handler))
        .route(
            "/rest/api/v1/owners",
            get(http::owners::list_owners_handler).post(http::owners::create_owner_handler),
        )
        .route(
            "/rest/api/v1/owners/{alias}",
            get(http::owners::get_owner_handler)
                .put(http::owners::update_owner_handler)
                .patch(http::owners::patch_owner_handler)
                .delete(http::owners::delete_owner_handler),
        )
        .route(
            "/rest/api/v1/services",
            get(http::services::list_services_handler)
                .post(http::services::create_service_handler),
        )
        .route(
            "/rest/api/v1/services/{name}",
            get(http::services::get_service_handler)
                .put(http::services::update_service_handler)
                .patch(http::services::patch_service_handler)
                .delete(http::services::delete_service_handler),
        )
        .route(
            "/rest/api/v1/services/{name}/promoters",
            get(http::services::service_promoters_handler),
        )
        .route(
            "/rest/api/v1/repositories",
            get(http::repositories::list_repositories_handler)
                .post(http::repositories::create_repository_handler),
        )
        .route(
            "/rest/api/v1/repositories/{key}",
            get(http::repositories::get_repository_handler)
                .put(http::repositories::update_repository_handler)
                .patch(http::repositories::patch_repository_handler)
                .delete(http::repositories::delete_repository_handler),
        )
        .route(
            "/rest/api/v1/owned-resources",
            get(http::handlers::owned_resources_handler),
        )
        .route("/webhook", post(http::webhook::webhook_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
