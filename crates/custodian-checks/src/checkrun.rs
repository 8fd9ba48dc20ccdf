// SPDX-License-Identifier: Apache-2.0

use crate::config::CheckConfig;
use crate::walker::{validate_revision_files, ValidationReport};
use crate::Annotation;
use async_trait::async_trait;
use custodian_core::Error;
use custodian_git::RevisionTree;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckConclusion {
    Success,
    Failure,
    TimedOut,
    Cancelled,
}

impl CheckConclusion {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedAction {
    FixFormatting,
    FixExemptions,
}

impl SuggestedAction {
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::FixFormatting => "fix-formatting",
            Self::FixExemptions => "fix-exemptions",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FixFormatting => "Fix formatting",
            Self::FixExemptions => "Fix exemptions",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::FixFormatting => "Reformat every metadata yaml file canonically",
            Self::FixExemptions => "Add missing exemptions to matching protection rules",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    pub text: Option<String>,
    pub annotations: Vec<Annotation>,
    pub actions: Vec<SuggestedAction>,
}

/// The hosted check-run API, seen only at its interface. Production uses
/// the HTTP client; tests record calls.
#[async_trait]
pub trait CheckRunHost: Send + Sync {
    async fn start_check_run(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        check_name: &str,
    ) -> Result<String, Error>;

    async fn conclude_check_run(
        &self,
        owner: &str,
        repo: &str,
        check_run_id: &str,
        conclusion: CheckConclusion,
        output: &CheckRunOutput,
    ) -> Result<(), Error>;
}

/// Validates one candidate revision and reports the result as a concluded
/// check-run. The whole run is bounded by an independent deadline so a
/// disconnected caller cannot leave the check-run in progress.
pub struct CheckRunner {
    host: Arc<dyn CheckRunHost>,
    cfg: CheckConfig,
}

const CONCLUDE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

impl CheckRunner {
    #[must_use]
    pub fn new(host: Arc<dyn CheckRunHost>, cfg: CheckConfig) -> Self {
        Self { host, cfg }
    }

    pub async fn run(&self, owner: &str, repo: &str, sha: &str) -> Result<CheckConclusion, Error> {
        let check_run_id = self
            .host
            .start_check_run(owner, repo, sha, &self.cfg.check_name)
            .await?;
        info!(owner, repo, sha, check_run_id, "check run started");

        let cfg = self.cfg.clone();
        let sha_owned = sha.to_string();
        let validation = timeout(
            self.cfg.run_deadline,
            tokio::task::spawn_blocking(move || validate_sha(&cfg, &sha_owned)),
        )
        .await;

        let (conclusion, output) = match validation {
            Ok(Ok(Ok(report))) => conclude_from_report(&self.cfg, &report),
            Ok(Ok(Err(err))) => {
                warn!(owner, repo, sha, error = %err, "validation aborted");
                (
                    CheckConclusion::Failure,
                    CheckRunOutput {
                        title: self.cfg.check_name.clone(),
                        summary: format!("validation aborted: {err}"),
                        text: None,
                        annotations: Vec::new(),
                        actions: Vec::new(),
                    },
                )
            }
            Ok(Err(join_err)) => {
                return Err(Error::internal(format!("validation task failed: {join_err}")))
            }
            Err(_elapsed) => (
                CheckConclusion::TimedOut,
                CheckRunOutput {
                    title: self.cfg.check_name.clone(),
                    summary: "validation did not finish within the deadline".to_string(),
                    text: None,
                    annotations: Vec::new(),
                    actions: Vec::new(),
                },
            ),
        };

        let first_attempt = timeout(
            CONCLUDE_CALL_TIMEOUT,
            self.host
                .conclude_check_run(owner, repo, &check_run_id, conclusion, &output),
        )
        .await;
        match first_attempt {
            Ok(result) => result?,
            Err(_elapsed) => {
                // One retry with a fresh call, downgraded to timed_out.
                warn!(owner, repo, check_run_id, "conclude timed out, retrying once");
                self.host
                    .conclude_check_run(
                        owner,
                        repo,
                        &check_run_id,
                        CheckConclusion::TimedOut,
                        &output,
                    )
                    .await?;
                return Ok(CheckConclusion::TimedOut);
            }
        }
        Ok(conclusion)
    }
}

fn validate_sha(cfg: &CheckConfig, sha: &str) -> Result<ValidationReport, Error> {
    let scratch = tempfile::tempdir()
        .map_err(|e| Error::internal(format!("scratch dir failed: {e}")))?;
    let revision = RevisionTree::fetch(
        &cfg.remote_url,
        sha,
        scratch.path(),
        cfg.ssh_key_path.clone(),
    )?;
    validate_revision_files(&revision, cfg)
}

fn conclude_from_report(
    cfg: &CheckConfig,
    report: &ValidationReport,
) -> (CheckConclusion, CheckRunOutput) {
    let mut actions = Vec::new();
    if report.needs_format_fix {
        actions.push(SuggestedAction::FixFormatting);
    }
    if report.needs_exemption_fix {
        actions.push(SuggestedAction::FixExemptions);
    }
    let conclusion = if report.is_success() {
        CheckConclusion::Success
    } else {
        CheckConclusion::Failure
    };
    (
        conclusion,
        CheckRunOutput {
            title: cfg.check_name.clone(),
            summary: report.summary(),
            text: report.body_text(),
            annotations: report.annotations.clone(),
            actions,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Repository, Signature};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingHost {
        concluded: Mutex<Vec<(String, CheckConclusion, usize)>>,
    }

    #[async_trait]
    impl CheckRunHost for RecordingHost {
        async fn start_check_run(
            &self,
            _owner: &str,
            _repo: &str,
            sha: &str,
            _check_name: &str,
        ) -> Result<String, Error> {
            Ok(format!("check-{sha}"))
        }

        async fn conclude_check_run(
            &self,
            _owner: &str,
            _repo: &str,
            check_run_id: &str,
            conclusion: CheckConclusion,
            output: &CheckRunOutput,
        ) -> Result<(), Error> {
            self.concluded.lock().expect("lock").push((
                check_run_id.to_string(),
                conclusion,
                output.annotations.len(),
            ));
            Ok(())
        }
    }

    fn seed_origin(dir: &std::path::Path, files: &[(&str, &str)]) -> String {
        let origin = Repository::init(dir).expect("init origin");
        for (path, contents) in files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(full, contents).expect("write");
        }
        let mut index = origin.index().expect("index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("add");
        index.write().expect("index write");
        let tree_id = index.write_tree().expect("tree");
        let tree = origin.find_tree(tree_id).expect("tree lookup");
        let sig = Signature::now("t", "t@example.com").expect("sig");
        origin
            .commit(Some("HEAD"), &sig, &sig, "META-1: seed", &tree, &[])
            .expect("commit")
            .to_string()
    }

    #[tokio::test]
    async fn failing_revision_concludes_failure_with_annotations() {
        let tmp = tempdir().expect("tempdir");
        let origin = tmp.path().join("origin");
        let sha = seed_origin(
            &origin,
            &[
                ("owners/a/owner.info.yaml", "contact: a@example.com\n"),
                ("owners/a/services/svc.yaml", "description: x\nbogus: 1\n"),
            ],
        );
        let host = Arc::new(RecordingHost::default());
        let cfg = CheckConfig {
            remote_url: origin.to_str().expect("utf8").to_string(),
            ..CheckConfig::default()
        };
        let runner = CheckRunner::new(host.clone(), cfg);
        let conclusion = runner.run("proj", "metadata", &sha).await.expect("run");
        assert_eq!(conclusion, CheckConclusion::Failure);
        let concluded = host.concluded.lock().expect("lock");
        assert_eq!(concluded.len(), 1);
        assert_eq!(concluded[0].1, CheckConclusion::Failure);
        assert!(concluded[0].2 >= 1);
    }

    #[tokio::test]
    async fn clean_revision_concludes_success() {
        let tmp = tempdir().expect("tempdir");
        let origin = tmp.path().join("origin");
        let owner_yaml = crate::canonicalize_yaml("contact: a@example.com\n").expect("canonical");
        let sha = seed_origin(&origin, &[("owners/a/owner.info.yaml", owner_yaml.as_str())]);
        let host = Arc::new(RecordingHost::default());
        let cfg = CheckConfig {
            remote_url: origin.to_str().expect("utf8").to_string(),
            ..CheckConfig::default()
        };
        let runner = CheckRunner::new(host.clone(), cfg);
        let conclusion = runner.run("proj", "metadata", &sha).await.expect("run");
        assert_eq!(conclusion, CheckConclusion::Success);
    }
}
