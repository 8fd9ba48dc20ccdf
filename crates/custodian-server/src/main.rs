// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use custodian_checks::{CheckConfig, CheckRunner, HostedCheckClient};
use custodian_git::{GitRepo, GitSettings};
use custodian_model::NameRules;
use custodian_server::cache::MetadataCache;
use custodian_server::config::{
    validate_startup_config_contract, CacheSettings, RuntimeConfig, TriggerSettings,
};
use custodian_server::mapper::Mapper;
use custodian_server::notify::{HttpNotifier, LoggingNotifier, Notifier};
use custodian_server::trigger::spawn_trigger;
use custodian_server::updater::Updater;
use custodian_server::{build_router, AppState};
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("CUSTODIAN_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn runtime_config() -> Result<RuntimeConfig, String> {
    let mut rules = NameRules::default();
    let types = env_list("CUSTODIAN_REPOSITORY_TYPES");
    if !types.is_empty() {
        rules.repository_types = types.into_iter().collect();
    }
    let alias_filter = env::var("CUSTODIAN_OWNER_ALIAS_FILTER")
        .unwrap_or_else(|_| "^[a-z0-9-]+$".to_string());
    Ok(RuntimeConfig {
        name_rules: rules,
        owner_alias_filter: Regex::new(&alias_filter)
            .map_err(|e| format!("invalid CUSTODIAN_OWNER_ALIAS_FILTER: {e}"))?,
        default_promoters: env_list("CUSTODIAN_DEFAULT_PROMOTERS"),
        additional_promoter_owners: env_list("CUSTODIAN_ADDITIONAL_PROMOTER_OWNERS"),
        max_body_bytes: env_usize("CUSTODIAN_MAX_BODY_BYTES", 256 * 1024),
        request_timeout: env_duration_ms("CUSTODIAN_REQUEST_TIMEOUT_MS", 30_000),
        webhook_update_timeout: env_duration_ms("CUSTODIAN_WEBHOOK_UPDATE_TIMEOUT_MS", 600_000),
    })
}

fn git_settings() -> Result<GitSettings, String> {
    let remote_url =
        env::var("CUSTODIAN_GIT_URL").map_err(|_| "CUSTODIAN_GIT_URL is required".to_string())?;
    let local_path = PathBuf::from(
        env::var("CUSTODIAN_GIT_LOCAL_PATH")
            .unwrap_or_else(|_| "artifacts/metadata-clone".to_string()),
    );
    let branch = env::var("CUSTODIAN_GIT_BRANCH").unwrap_or_else(|_| "master".to_string());
    let mut settings = GitSettings::new(&remote_url, &local_path, &branch);
    if let Ok(name) = env::var("CUSTODIAN_GIT_COMMITTER_NAME") {
        settings.committer_name = name;
    }
    if let Ok(email) = env::var("CUSTODIAN_GIT_COMMITTER_EMAIL") {
        settings.committer_email = email;
    }
    settings.ssh_key_path = env::var("CUSTODIAN_GIT_SSH_KEY").ok().map(PathBuf::from);
    Ok(settings)
}

fn check_runner(git: &GitSettings) -> Option<Arc<CheckRunner>> {
    let base_url = env::var("CUSTODIAN_CHECK_API_URL").ok()?;
    let token = env::var("CUSTODIAN_CHECK_API_TOKEN").ok();
    let host = Arc::new(HostedCheckClient::new(&base_url, token));
    let cfg = CheckConfig {
        remote_url: git.remote_url.clone(),
        ssh_key_path: git.ssh_key_path.clone(),
        run_deadline: env_duration_ms("CUSTODIAN_CHECK_DEADLINE_MS", 60_000),
        ..CheckConfig::default()
    };
    Some(Arc::new(CheckRunner::new(host, cfg)))
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let runtime = Arc::new(runtime_config()?);
    let cache_settings = CacheSettings {
        redis_url: env::var("CUSTODIAN_REDIS_URL").ok(),
        redis_prefix: env::var("CUSTODIAN_REDIS_PREFIX").unwrap_or_else(|_| "custodian".to_string()),
        redis_op_timeout: env_duration_ms("CUSTODIAN_REDIS_TIMEOUT_MS", 500),
        ..CacheSettings::default()
    };
    let trigger_settings = TriggerSettings {
        update_interval: env_duration_ms("CUSTODIAN_UPDATE_INTERVAL_MS", 300_000),
        run_timeout: env_duration_ms("CUSTODIAN_UPDATE_TIMEOUT_MS", 120_000),
    };
    validate_startup_config_contract(&runtime, &cache_settings, &trigger_settings)?;

    let git = git_settings()?;
    let repo = GitRepo::open_or_clone(git.clone()).map_err(|e| e.to_string())?;
    let mapper = Mapper::new(repo, Arc::clone(&runtime));
    let cache = Arc::new(MetadataCache::from_settings(&cache_settings).map_err(|e| e.to_string())?);
    let notifier: Arc<dyn Notifier> = match env::var("CUSTODIAN_NOTIFY_URL") {
        Ok(url) => Arc::new(HttpNotifier::new(&url)),
        Err(_) => Arc::new(LoggingNotifier),
    };
    let updater = Updater::new(mapper, Arc::clone(&cache), notifier);

    let state = AppState::new(
        Arc::clone(&updater),
        Arc::clone(&cache),
        Arc::clone(&runtime),
        check_runner(&git),
    );

    // The sender side of the external event channel belongs to out-of-scope
    // collaborators; it stays alive for the process lifetime.
    let (_event_sender, event_receiver) = tokio::sync::mpsc::channel(64);
    spawn_trigger(
        Arc::clone(&updater),
        event_receiver,
        trigger_settings,
        Arc::clone(&state.ready),
    );

    let bind_addr = env::var("CUSTODIAN_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("bind {bind_addr} failed: {e}"))?;
    info!("custodian-server listening on {bind_addr}");

    let app = build_router(state.clone());
    let accepting = state.accepting_requests.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            accepting.store(false, Ordering::Relaxed);
            let drain_ms = env_u64("CUSTODIAN_SHUTDOWN_DRAIN_MS", 5000);
            tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
