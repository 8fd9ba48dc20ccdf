// SPDX-License-Identifier: Apache-2.0

use custodian_git::{GitRepo, GitSettings};
use custodian_server::cache::MetadataCache;
use custodian_server::config::RuntimeConfig;
use custodian_server::mapper::Mapper;
use custodian_server::notify::LoggingNotifier;
use custodian_server::updater::Updater;
use custodian_server::{build_router, AppState};
use git2::{IndexAddOption, Repository, Signature};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const OWNER_A: &str = "team-a";
const OWNER_B: &str = "team-b";

fn seed_remote(dir: &Path, files: &[(&str, &str)]) -> (String, String) {
    let remote_dir = dir.join("remote.git");
    Repository::init_bare(&remote_dir).expect("init bare remote");
    let seed_dir = dir.join("seed");
    let seed = Repository::clone(remote_dir.to_str().expect("utf8 path"), &seed_dir)
        .expect("clone seed");
    for (path, contents) in files {
        let full = seed_dir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(full, contents).expect("seed file");
    }
    let mut index = seed.index().expect("index");
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .expect("add");
    index.write().expect("index write");
    let tree_id = index.write_tree().expect("tree");
    let tree = seed.find_tree(tree_id).expect("tree lookup");
    let sig = Signature::now("seed", "seed@example.com").expect("sig");
    seed.commit(Some("HEAD"), &sig, &sig, "META-1: seed metadata", &tree, &[])
        .expect("initial commit");
    let head = seed.head().expect("head");
    let branch = head.shorthand().expect("branch name").to_string();
    let mut remote = seed.find_remote("origin").expect("origin");
    remote
        .push(
            &[format!("refs/heads/{branch}:refs/heads/{branch}").as_str()],
            None,
        )
        .expect("seed push");
    (
        remote_dir.to_str().expect("utf8 path").to_string(),
        branch,
    )
}

fn default_fixture() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "owners/team-a/owner.info.yaml",
            "contact: a@example.com\nproductOwner: po-a\npromoters:\n- promoter-one\n",
        ),
        (
            "owners/team-b/owner.info.yaml",
            "contact: b@example.com\nproductOwner: po-b\n",
        ),
        (
            "owners/team-a/services/svc.yaml",
            "description: payments\nrepositories:\n- svc.implementation\n- svc.helm-deployment\n",
        ),
        (
            "owners/team-a/repositories/svc.implementation.yaml",
            "url: ssh://git@host/proj/impl.git\nmainline: master\n",
        ),
        (
            "owners/team-a/repositories/svc.helm-deployment.yaml",
            "url: ssh://git@host/proj/helm.git\nmainline: master\ngenerator: foo\nconfiguration:\n  approvers:\n    admins:\n    - alice\n",
        ),
    ]
}

async fn start_server(tmp: &TempDir, remote_url: &str, branch: &str) -> (SocketAddr, AppState) {
    let settings = GitSettings::new(remote_url, &tmp.path().join("server-clone"), branch);
    let repo = GitRepo::open_or_clone(settings).expect("server clone");
    let runtime = Arc::new(RuntimeConfig::default());
    let mapper = Mapper::new(repo, Arc::clone(&runtime));
    let cache = Arc::new(MetadataCache::in_memory());
    let updater = Updater::new(mapper, Arc::clone(&cache), Arc::new(LoggingNotifier));
    let state = AppState::new(Arc::clone(&updater), cache, runtime, None);
    {
        let mut txn = updater.lock().await;
        txn.perform_full_update().await.expect("initial populate");
    }
    state.ready.store(true, Ordering::Relaxed);
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (addr, state)
}

fn other_clone(tmp: &TempDir, remote_url: &str, branch: &str, name: &str) -> GitRepo {
    let settings = GitSettings::new(remote_url, &tmp.path().join(name), branch);
    GitRepo::open_or_clone(settings).expect("secondary clone")
}

async fn get_json(client: &reqwest::Client, addr: SocketAddr, path: &str) -> (u16, Value) {
    let response = client
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .expect("request");
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn startup_populates_caches_and_stamps_audit_fields() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let (status, owners) = get_json(&client, addr, "/rest/api/v1/owners").await;
    assert_eq!(status, 200);
    let aliases: Vec<&str> = owners
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|o| o["alias"].as_str())
        .collect();
    assert_eq!(aliases, vec![OWNER_A, OWNER_B]);

    let (status, owner) = get_json(&client, addr, &format!("/rest/api/v1/owners/{OWNER_A}")).await;
    assert_eq!(status, 200);
    assert_eq!(owner["contact"], "a@example.com");
    assert_eq!(owner["jiraIssue"], "META-1");
    assert!(owner["commitHash"].as_str().is_some_and(|h| h.len() == 40));
    assert!(owner["timeStamp"].as_str().is_some());

    let (status, repo) = get_json(
        &client,
        addr,
        "/rest/api/v1/repositories/svc.implementation",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(repo["owner"], OWNER_A);
    assert_eq!(repo["mainline"], "master");
}

#[tokio::test]
async fn concurrent_update_is_detected_and_returns_the_refreshed_record() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let (_, mut owner) = get_json(&client, addr, &format!("/rest/api/v1/owners/{OWNER_A}")).await;
    let stale_hash = owner["commitHash"].as_str().expect("hash").to_string();

    // Client B commits out of band before client A's PUT lands.
    let external = other_clone(&tmp, &remote_url, &branch, "external");
    external
        .write_file(
            "owners/team-a/owner.info.yaml",
            b"contact: changed@example.com\nproductOwner: po-a\npromoters:\n- promoter-one\n",
        )
        .expect("write");
    external
        .commit("META-2: update owner team-a")
        .expect("commit");
    external.push().expect("push");

    owner["contact"] = json!("a-wants-this@example.com");
    owner["jiraIssue"] = json!("META-3");
    let response = client
        .put(format!("http://{addr}/rest/api/v1/owners/{OWNER_A}"))
        .json(&owner)
        .send()
        .await
        .expect("put");
    assert_eq!(response.status().as_u16(), 409);
    let body = response.json::<Value>().await.expect("body");
    assert_eq!(body["error"]["kind"], "concurrency");
    let refreshed_hash = body["current"]["commitHash"].as_str().expect("hash");
    assert_ne!(refreshed_hash, stale_hash);
    assert_eq!(body["current"]["contact"], "changed@example.com");
}

#[tokio::test]
async fn service_owner_move_drags_repositories_in_one_commit() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let (_, mut service) = get_json(&client, addr, "/rest/api/v1/services/svc").await;
    service["owner"] = json!(OWNER_B);
    service["jiraIssue"] = json!("META-4");
    let response = client
        .put(format!("http://{addr}/rest/api/v1/services/svc"))
        .json(&service)
        .send()
        .await
        .expect("put");
    assert_eq!(response.status().as_u16(), 200);
    let moved = response.json::<Value>().await.expect("body");
    assert_eq!(moved["owner"], OWNER_B);

    // The referenced repositories moved with the service.
    let (_, repo) = get_json(
        &client,
        addr,
        "/rest/api/v1/repositories/svc.implementation",
    )
    .await;
    assert_eq!(repo["owner"], OWNER_B);

    // One commit covers the whole move.
    let verifier = other_clone(&tmp, &remote_url, &branch, "verifier");
    let head = verifier.head_commit().expect("head");
    assert!(head.message.contains("META-4: move service svc from team-a to team-b"));
    let files: BTreeSet<&str> = head.files_changed.iter().map(String::as_str).collect();
    let expected: BTreeSet<&str> = [
        "owners/team-a/services/svc.yaml",
        "owners/team-b/services/svc.yaml",
        "owners/team-a/repositories/svc.implementation.yaml",
        "owners/team-b/repositories/svc.implementation.yaml",
        "owners/team-a/repositories/svc.helm-deployment.yaml",
        "owners/team-b/repositories/svc.helm-deployment.yaml",
    ]
    .into_iter()
    .collect();
    assert_eq!(files, expected);
}

#[tokio::test]
async fn referenced_repository_cannot_move_or_be_deleted() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let (_, mut repo) = get_json(
        &client,
        addr,
        "/rest/api/v1/repositories/svc.implementation",
    )
    .await;
    repo["owner"] = json!(OWNER_B);
    repo["jiraIssue"] = json!("META-5");
    let response = client
        .put(format!(
            "http://{addr}/rest/api/v1/repositories/svc.implementation"
        ))
        .json(&repo)
        .send()
        .await
        .expect("put");
    assert_eq!(response.status().as_u16(), 409);
    let body = response.json::<Value>().await.expect("body");
    assert_eq!(body["error"]["kind"], "referenced");

    let response = client
        .delete(format!(
            "http://{addr}/rest/api/v1/repositories/svc.implementation?jiraIssue=META-5"
        ))
        .send()
        .await
        .expect("delete");
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn owner_delete_is_blocked_until_unreferenced() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let response = client
        .delete(format!(
            "http://{addr}/rest/api/v1/owners/{OWNER_A}?jiraIssue=META-6"
        ))
        .send()
        .await
        .expect("delete");
    assert_eq!(response.status().as_u16(), 409);
    let body = response.json::<Value>().await.expect("body");
    assert_eq!(body["error"]["kind"], "referenced");

    // team-b owns nothing and can go.
    let response = client
        .delete(format!(
            "http://{addr}/rest/api/v1/owners/{OWNER_B}?jiraIssue=META-6"
        ))
        .send()
        .await
        .expect("delete");
    assert_eq!(response.status().as_u16(), 204);
    let (status, _) = get_json(&client, addr, &format!("/rest/api/v1/owners/{OWNER_B}")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn patch_clears_and_retains_fields() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let (_, current) = get_json(
        &client,
        addr,
        "/rest/api/v1/repositories/svc.helm-deployment",
    )
    .await;
    assert_eq!(current["generator"], "foo");

    let patch = json!({
        "generator": "",
        "configuration": {"approvers": {}},
        "timeStamp": current["timeStamp"],
        "commitHash": current["commitHash"],
        "jiraIssue": "META-7",
    });
    let response = client
        .patch(format!(
            "http://{addr}/rest/api/v1/repositories/svc.helm-deployment"
        ))
        .json(&patch)
        .send()
        .await
        .expect("patch");
    assert_eq!(response.status().as_u16(), 200);
    let patched = response.json::<Value>().await.expect("body");
    assert!(patched["generator"].is_null());
    assert!(patched["configuration"]["approvers"].is_null());
    // Untouched fields survive.
    assert_eq!(patched["url"], "ssh://git@host/proj/helm.git");
    assert_eq!(patched["mainline"], "master");
    // Audit fields advanced with the new commit.
    assert_ne!(patched["commitHash"], current["commitHash"]);
    assert_eq!(patched["jiraIssue"], "META-7");
}

#[tokio::test]
async fn create_update_and_promoters_flow() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    // Create a repository, then a service referencing it.
    let repository = json!({
        "key": "billing.implementation",
        "owner": OWNER_B,
        "url": "ssh://git@host/proj/billing.git",
        "mainline": "main",
        "jiraIssue": "META-8",
    });
    let response = client
        .post(format!("http://{addr}/rest/api/v1/repositories"))
        .json(&repository)
        .send()
        .await
        .expect("post repository");
    assert_eq!(response.status().as_u16(), 201);

    // A second create of the same key conflicts.
    let response = client
        .post(format!("http://{addr}/rest/api/v1/repositories"))
        .json(&repository)
        .send()
        .await
        .expect("post repository again");
    assert_eq!(response.status().as_u16(), 409);

    let service = json!({
        "name": "billing",
        "owner": OWNER_B,
        "description": "billing service",
        "repositories": ["billing.implementation"],
        "jiraIssue": "META-8",
    });
    let response = client
        .post(format!("http://{addr}/rest/api/v1/services"))
        .json(&service)
        .send()
        .await
        .expect("post service");
    assert_eq!(response.status().as_u16(), 201);
    let created = response.json::<Value>().await.expect("body");
    assert_eq!(created["jiraIssue"], "META-8");

    // Promoters: defaults are empty, so the union is the owner's promoters
    // plus every product owner.
    let (status, promoters) = get_json(
        &client,
        addr,
        "/rest/api/v1/services/billing/promoters",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        promoters["promoters"],
        json!(["po-a", "po-b"])
    );
    let (_, svc_promoters) = get_json(&client, addr, "/rest/api/v1/services/svc/promoters").await;
    assert_eq!(
        svc_promoters["promoters"],
        json!(["po-a", "po-b", "promoter-one"])
    );

    // Listing filters.
    let (_, by_owner) = get_json(
        &client,
        addr,
        &format!("/rest/api/v1/repositories?owner={OWNER_B}"),
    )
    .await;
    assert_eq!(by_owner.as_array().expect("array").len(), 1);
    let (_, by_service) = get_json(&client, addr, "/rest/api/v1/repositories?service=svc").await;
    assert_eq!(by_service.as_array().expect("array").len(), 2);

    // Unknown repository type fails validation.
    let invalid = json!({
        "key": "billing.container",
        "owner": OWNER_B,
        "url": "ssh://git@host/proj/billing2.git",
        "mainline": "main",
        "jiraIssue": "META-8",
    });
    let response = client
        .post(format!("http://{addr}/rest/api/v1/repositories"))
        .json(&invalid)
        .send()
        .await
        .expect("post invalid");
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn webhook_triggers_an_asynchronous_refresh() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let external = other_clone(&tmp, &remote_url, &branch, "external");
    external
        .write_file(
            "owners/team-b/owner.info.yaml",
            b"contact: webhook@example.com\nproductOwner: po-b\n",
        )
        .expect("write");
    external
        .commit("META-9: update owner team-b")
        .expect("commit");
    external.push().expect("push");

    let response = client
        .post(format!("http://{addr}/webhook"))
        .send()
        .await
        .expect("webhook");
    assert_eq!(response.status().as_u16(), 204);

    let mut refreshed = false;
    for _ in 0..50 {
        let (_, owner) =
            get_json(&client, addr, &format!("/rest/api/v1/owners/{OWNER_B}")).await;
        if owner["contact"] == "webhook@example.com" {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(refreshed, "webhook-driven update never landed");
}

#[tokio::test]
async fn owned_resources_joins_all_three_kinds() {
    let tmp = tempdir().expect("tempdir");
    let (remote_url, branch) = seed_remote(tmp.path(), &default_fixture());
    let (addr, _state) = start_server(&tmp, &remote_url, &branch).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, addr, "/rest/api/v1/owned-resources").await;
    assert_eq!(status, 200);
    let rows = body["owners"].as_array().expect("owners");
    let team_a = rows
        .iter()
        .find(|row| row["owner"]["alias"] == OWNER_A)
        .expect("team-a row");
    assert_eq!(team_a["services"].as_array().expect("services").len(), 1);
    assert_eq!(
        team_a["repositories"].as_array().expect("repositories").len(),
        2
    );
}
