// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, TimeZone, Utc};
use custodian_core::Error;
use custodian_model::CommitInfo;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Commit, Cred, Diff, DiffOptions, ErrorClass, ErrorCode, FetchOptions, IndexAddOption, Oid,
    PushOptions, RemoteCallbacks, Repository, ResetType, Signature, Sort,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GitSettings {
    pub remote_url: String,
    pub local_path: PathBuf,
    pub branch: String,
    pub committer_name: String,
    pub committer_email: String,
    /// Private key file for ssh remotes; the ssh agent is used when unset.
    pub ssh_key_path: Option<PathBuf>,
}

impl GitSettings {
    #[must_use]
    pub fn new(remote_url: &str, local_path: &Path, branch: &str) -> Self {
        Self {
            remote_url: remote_url.to_string(),
            local_path: local_path.to_path_buf(),
            branch: branch.to_string(),
            committer_name: "custodian".to_string(),
            committer_email: "custodian@localhost".to_string(),
            ssh_key_path: None,
        }
    }
}

pub(crate) fn credential_callbacks<'cb>(ssh_key_path: Option<PathBuf>) -> RemoteCallbacks<'cb> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username, allowed| {
        let user = username.unwrap_or("git");
        if allowed.is_ssh_key() {
            if let Some(key) = &ssh_key_path {
                return Cred::ssh_key(user, None, key, None);
            }
            return Cred::ssh_key_from_agent(user);
        }
        Cred::default()
    });
    callbacks
}

fn map_git_error(context: &str, err: &git2::Error) -> Error {
    if err.class() == ErrorClass::Net || err.class() == ErrorClass::Ssh {
        return Error::downstream(format!("{context}: {}", err.message()));
    }
    if err.code() == ErrorCode::NotFastForward {
        return Error::concurrency(format!("{context}: {}", err.message()));
    }
    Error::internal(format!("{context}: {}", err.message()))
}

fn commit_timestamp(commit: &Commit<'_>) -> DateTime<Utc> {
    Utc.timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn diff_paths(diff: &Diff<'_>) -> Vec<String> {
    let mut paths = Vec::new();
    for delta in diff.deltas() {
        for file in [delta.old_file(), delta.new_file()] {
            if let Some(path) = file.path().and_then(Path::to_str) {
                if !paths.iter().any(|p| p == path) {
                    paths.push(path.to_string());
                }
            }
        }
    }
    paths
}

fn commit_diff<'r>(
    repo: &'r Repository,
    commit: &Commit<'r>,
    opts: Option<&mut DiffOptions>,
) -> Result<Diff<'r>, git2::Error> {
    let tree = commit.tree()?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree()?),
        Err(_) => None,
    };
    repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), opts)
}

fn commit_info(repo: &Repository, commit: &Commit<'_>) -> Result<CommitInfo, Error> {
    let diff =
        commit_diff(repo, commit, None).map_err(|e| map_git_error("commit diff failed", &e))?;
    Ok(CommitInfo {
        commit_hash: commit.id().to_string(),
        time_stamp: commit_timestamp(commit),
        message: commit.message().unwrap_or_default().trim_end().to_string(),
        files_changed: diff_paths(&diff),
    })
}

/// The service's local working copy of the metadata repository.
///
/// At most one write-side operation may be in flight; the Updater's
/// metadata lock provides that serialisation. After a failed mutation that
/// is not a plain "no changes" outcome, the owner restores a clean state
/// via [`GitRepo::clone_fresh`].
pub struct GitRepo {
    settings: GitSettings,
    repo: Repository,
    last_pulled: Vec<CommitInfo>,
}

impl GitRepo {
    pub fn open_or_clone(settings: GitSettings) -> Result<Self, Error> {
        let repo = if settings.local_path.join(".git").exists() {
            Repository::open(&settings.local_path)
                .map_err(|e| map_git_error("open local clone failed", &e))?
        } else {
            Self::clone_into(&settings)?
        };
        Ok(Self {
            settings,
            repo,
            last_pulled: Vec::new(),
        })
    }

    fn clone_into(settings: &GitSettings) -> Result<Repository, Error> {
        std::fs::create_dir_all(&settings.local_path)
            .map_err(|e| Error::internal(format!("create clone dir failed: {e}")))?;
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(credential_callbacks(settings.ssh_key_path.clone()));
        info!(url = %settings.remote_url, "cloning metadata repository");
        RepoBuilder::new()
            .branch(&settings.branch)
            .fetch_options(fetch)
            .clone(&settings.remote_url, &settings.local_path)
            .map_err(|e| map_git_error("clone failed", &e))
    }

    #[must_use]
    pub fn settings(&self) -> &GitSettings {
        &self.settings
    }

    #[must_use]
    pub fn workdir(&self) -> &Path {
        self.repo.workdir().unwrap_or(&self.settings.local_path)
    }

    /// Fetches the remote branch, fast-forwards the working copy, and
    /// returns the commits that arrived since the previous head, oldest
    /// first. The same list stays available via [`GitRepo::new_pulled_commits`]
    /// until the next pull.
    pub fn pull(&mut self) -> Result<Vec<CommitInfo>, Error> {
        let old_head = self.repo.head().ok().and_then(|h| h.target());
        let fetched_id = {
            let mut remote = self
                .repo
                .find_remote("origin")
                .map_err(|e| map_git_error("origin remote missing", &e))?;
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(credential_callbacks(self.settings.ssh_key_path.clone()));
            remote
                .fetch(&[self.settings.branch.as_str()], Some(&mut fetch), None)
                .map_err(|e| map_git_error("fetch failed", &e))?;
            let fetch_head = self
                .repo
                .find_reference("FETCH_HEAD")
                .map_err(|e| map_git_error("FETCH_HEAD missing", &e))?;
            fetch_head
                .target()
                .ok_or_else(|| Error::internal("FETCH_HEAD is not a direct reference"))?
        };

        if Some(fetched_id) != old_head {
            let refname = format!("refs/heads/{}", self.settings.branch);
            match self.repo.find_reference(&refname) {
                Ok(mut reference) => {
                    reference
                        .set_target(fetched_id, "custodian: fast-forward")
                        .map_err(|e| map_git_error("fast-forward failed", &e))?;
                }
                Err(_) => {
                    self.repo
                        .reference(&refname, fetched_id, true, "custodian: branch create")
                        .map_err(|e| map_git_error("branch create failed", &e))?;
                }
            }
            self.repo
                .set_head(&refname)
                .map_err(|e| map_git_error("set head failed", &e))?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))
                .map_err(|e| map_git_error("checkout failed", &e))?;
        }

        self.last_pulled = self.commits_between(old_head, fetched_id)?;
        Ok(self.last_pulled.clone())
    }

    fn commits_between(
        &self,
        old: Option<Oid>,
        new: Oid,
    ) -> Result<Vec<CommitInfo>, Error> {
        if old == Some(new) {
            return Ok(Vec::new());
        }
        let mut walk = self
            .repo
            .revwalk()
            .map_err(|e| map_git_error("revwalk failed", &e))?;
        walk.push(new)
            .map_err(|e| map_git_error("revwalk push failed", &e))?;
        if let Some(old) = old {
            walk.hide(old)
                .map_err(|e| map_git_error("revwalk hide failed", &e))?;
        }
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
            .map_err(|e| map_git_error("revwalk sort failed", &e))?;
        let mut commits = Vec::new();
        for oid in walk {
            let oid = oid.map_err(|e| map_git_error("revwalk step failed", &e))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| map_git_error("commit lookup failed", &e))?;
            commits.push(commit_info(&self.repo, &commit)?);
        }
        Ok(commits)
    }

    /// Commits that arrived with the most recent pull, oldest first.
    #[must_use]
    pub fn new_pulled_commits(&self) -> Vec<CommitInfo> {
        self.last_pulled.clone()
    }

    #[must_use]
    pub fn is_commit_known(&self, hash: &str) -> bool {
        Oid::from_str(hash)
            .ok()
            .and_then(|oid| self.repo.find_commit(oid).ok())
            .is_some()
    }

    pub fn head_commit(&self) -> Result<CommitInfo, Error> {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| map_git_error("head lookup failed", &e))?;
        commit_info(&self.repo, &head)
    }

    /// Reads a file from the working copy along with the last commit that
    /// touched it.
    pub fn read_file(&self, rel: &str) -> Result<(Vec<u8>, CommitInfo), Error> {
        let full = self.workdir().join(rel);
        let bytes = std::fs::read(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("file not found: {rel}"))
            } else {
                Error::internal(format!("read {rel} failed: {e}"))
            }
        })?;
        let info = self.last_commit_for(rel)?;
        Ok((bytes, info))
    }

    fn last_commit_for(&self, rel: &str) -> Result<CommitInfo, Error> {
        let mut walk = self
            .repo
            .revwalk()
            .map_err(|e| map_git_error("revwalk failed", &e))?;
        walk.push_head()
            .map_err(|e| map_git_error("revwalk push failed", &e))?;
        walk.set_sorting(Sort::TOPOLOGICAL)
            .map_err(|e| map_git_error("revwalk sort failed", &e))?;
        for oid in walk {
            let oid = oid.map_err(|e| map_git_error("revwalk step failed", &e))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| map_git_error("commit lookup failed", &e))?;
            let mut opts = DiffOptions::new();
            opts.pathspec(rel);
            let diff = commit_diff(&self.repo, &commit, Some(&mut opts))
                .map_err(|e| map_git_error("commit diff failed", &e))?;
            if diff.deltas().len() > 0 {
                return commit_info(&self.repo, &commit);
            }
        }
        // Tracked but never committed; treat as part of the head commit.
        self.head_commit()
    }

    #[must_use]
    pub fn stat(&self, rel: &str) -> bool {
        self.workdir().join(rel).exists()
    }

    /// Sorted entry names of a directory inside the working copy. A missing
    /// directory reads as empty.
    pub fn read_dir(&self, rel: &str) -> Result<Vec<String>, Error> {
        let full = self.workdir().join(rel);
        if !full.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&full)
            .map_err(|e| Error::internal(format!("read dir {rel} failed: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::internal(format!("read dir {rel} failed: {e}")))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn write_file(&self, rel: &str, bytes: &[u8]) -> Result<(), Error> {
        let full = self.workdir().join(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::internal(format!("mkdir for {rel} failed: {e}")))?;
        }
        std::fs::write(&full, bytes).map_err(|e| Error::internal(format!("write {rel} failed: {e}")))
    }

    pub fn mkdir_all(&self, rel: &str) -> Result<(), Error> {
        std::fs::create_dir_all(self.workdir().join(rel))
            .map_err(|e| Error::internal(format!("mkdir {rel} failed: {e}")))
    }

    pub fn delete_file(&self, rel: &str) -> Result<(), Error> {
        let full = self.workdir().join(rel);
        std::fs::remove_file(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("file not found: {rel}"))
            } else {
                Error::internal(format!("delete {rel} failed: {e}"))
            }
        })
    }

    /// Stages every change in the working copy and commits it. An empty
    /// diff yields the distinct no-changes signal instead of a commit.
    pub fn commit(&self, message: &str) -> Result<CommitInfo, Error> {
        self.commit_with_author(
            message,
            &self.settings.committer_name,
            &self.settings.committer_email,
        )
    }

    /// Commit with an explicit author; the configured identity stays the
    /// committer.
    pub fn commit_with_author(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<CommitInfo, Error> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| map_git_error("index open failed", &e))?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(|e| map_git_error("index add failed", &e))?;
        index
            .update_all(["*"].iter(), None)
            .map_err(|e| map_git_error("index update failed", &e))?;
        index
            .write()
            .map_err(|e| map_git_error("index write failed", &e))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| map_git_error("tree write failed", &e))?;
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| map_git_error("head lookup failed", &e))?;
        if tree_id == head.tree_id() {
            return Err(Error::no_changes());
        }
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| map_git_error("tree lookup failed", &e))?;
        let author = Signature::now(author_name, author_email)
            .map_err(|e| map_git_error("author signature failed", &e))?;
        let committer = Signature::now(
            &self.settings.committer_name,
            &self.settings.committer_email,
        )
        .map_err(|e| map_git_error("committer signature failed", &e))?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &author, &committer, message, &tree, &[&head])
            .map_err(|e| map_git_error("commit failed", &e))?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| map_git_error("commit lookup failed", &e))?;
        commit_info(&self.repo, &commit)
    }

    /// Pushes the local branch. A rejected non-fast-forward push surfaces
    /// as a concurrency error so the caller can refresh and retry.
    pub fn push(&self) -> Result<(), Error> {
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut remote = self
            .repo
            .find_remote("origin")
            .map_err(|e| map_git_error("origin remote missing", &e))?;
        let mut callbacks = credential_callbacks(self.settings.ssh_key_path.clone());
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        let refspec = format!(
            "refs/heads/{b}:refs/heads/{b}",
            b = self.settings.branch
        );
        remote
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(|e| {
                let normalized = e.message().to_lowercase().replace(['-', ' '], "");
                if normalized.contains("fastforward") {
                    Error::concurrency(format!("push rejected: {}", e.message()))
                } else {
                    map_git_error("push failed", &e)
                }
            })?;
        let rejected = rejection.borrow().clone();
        if let Some(message) = rejected {
            return Err(Error::concurrency(format!("push rejected: {message}")));
        }
        Ok(())
    }

    /// Discards local modifications and resets the working copy to the
    /// current head commit.
    pub fn reset_hard(&self) -> Result<(), Error> {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel(git2::ObjectType::Commit))
            .map_err(|e| map_git_error("head lookup failed", &e))?;
        self.repo
            .reset(&head, ResetType::Hard, None)
            .map_err(|e| map_git_error("reset failed", &e))
    }

    /// Deletes the local working copy and clones it again from the remote.
    /// Used to restore a clean state after a failed mutation.
    pub fn clone_fresh(&mut self) -> Result<(), Error> {
        warn!(path = %self.settings.local_path.display(), "re-cloning metadata repository");
        if self.settings.local_path.exists() {
            std::fs::remove_dir_all(&self.settings.local_path)
                .map_err(|e| Error::internal(format!("remove clone dir failed: {e}")))?;
        }
        self.repo = Self::clone_into(&self.settings)?;
        self.last_pulled.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_remote(dir: &Path) -> String {
        let remote_dir = dir.join("remote.git");
        Repository::init_bare(&remote_dir).expect("init bare remote");
        // Seed the remote through a scratch clone so it has a main branch.
        let seed_dir = dir.join("seed");
        let seed = Repository::clone(remote_dir.to_str().expect("utf8 path"), &seed_dir)
            .expect("clone seed");
        std::fs::create_dir_all(seed_dir.join("owners/platform")).expect("mkdir");
        std::fs::write(
            seed_dir.join("owners/platform/owner.info.yaml"),
            "contact: team@example.com\n",
        )
        .expect("seed file");
        let mut index = seed.index().expect("index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("add");
        index.write().expect("index write");
        let tree_id = index.write_tree().expect("tree");
        let tree = seed.find_tree(tree_id).expect("tree lookup");
        let sig = Signature::now("seed", "seed@example.com").expect("sig");
        seed.commit(Some("HEAD"), &sig, &sig, "META-1: seed", &tree, &[])
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
        branch
    }

    fn open_repo(dir: &Path, branch: &str) -> GitRepo {
        let remote_url = dir.join("remote.git").to_str().expect("utf8").to_string();
        let settings = GitSettings::new(&remote_url, &dir.join("clone"), branch);
        GitRepo::open_or_clone(settings).expect("open or clone")
    }

    #[test]
    fn clone_write_commit_push_and_repull() {
        let tmp = tempdir().expect("tempdir");
        let branch = seed_remote(tmp.path());
        let mut repo = open_repo(tmp.path(), &branch);

        repo.write_file(
            "owners/platform/services/payments.yaml",
            b"description: payments\n",
        )
        .expect("write");
        let info = repo.commit("META-2: update service payments").expect("commit");
        assert!(info
            .files_changed
            .contains(&"owners/platform/services/payments.yaml".to_string()));
        repo.push().expect("push");

        // A second clone sees the commit arrive through pull.
        let remote_url = tmp
            .path()
            .join("remote.git")
            .to_str()
            .expect("utf8")
            .to_string();
        let settings = GitSettings::new(&remote_url, &tmp.path().join("clone2"), &branch);
        let mut other = GitRepo::open_or_clone(settings).expect("second clone");
        assert!(other.is_commit_known(&info.commit_hash));

        repo.write_file(
            "owners/platform/services/checkout.yaml",
            b"description: checkout\n",
        )
        .expect("write 2");
        let second = repo.commit("META-3: update service checkout").expect("commit 2");
        repo.push().expect("push 2");

        let pulled = other.pull().expect("pull");
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].commit_hash, second.commit_hash);
        assert_eq!(other.new_pulled_commits(), pulled);
    }

    #[test]
    fn empty_commit_signals_no_changes() {
        let tmp = tempdir().expect("tempdir");
        let branch = seed_remote(tmp.path());
        let repo = open_repo(tmp.path(), &branch);
        let err = repo.commit("META-4: nothing").expect_err("no changes");
        assert!(err.is_no_changes());
    }

    #[test]
    fn read_file_reports_last_touching_commit() {
        let tmp = tempdir().expect("tempdir");
        let branch = seed_remote(tmp.path());
        let repo = open_repo(tmp.path(), &branch);

        repo.write_file("owners/platform/services/payments.yaml", b"description: a\n")
            .expect("write");
        let first = repo.commit("META-5: update service payments").expect("commit");
        repo.write_file("owners/platform/services/checkout.yaml", b"description: b\n")
            .expect("write other");
        repo.commit("META-6: update service checkout").expect("commit other");

        let (_, info) = repo
            .read_file("owners/platform/services/payments.yaml")
            .expect("read");
        assert_eq!(info.commit_hash, first.commit_hash);
    }

    #[test]
    fn delete_and_stat() {
        let tmp = tempdir().expect("tempdir");
        let branch = seed_remote(tmp.path());
        let repo = open_repo(tmp.path(), &branch);
        assert!(repo.stat("owners/platform/owner.info.yaml"));
        repo.delete_file("owners/platform/owner.info.yaml").expect("delete");
        assert!(!repo.stat("owners/platform/owner.info.yaml"));
        let info = repo.commit("META-7: delete owner platform").expect("commit");
        assert!(info
            .files_changed
            .contains(&"owners/platform/owner.info.yaml".to_string()));
    }

    #[test]
    fn non_fast_forward_push_is_a_concurrency_error() {
        let tmp = tempdir().expect("tempdir");
        let branch = seed_remote(tmp.path());
        let repo_a = open_repo(tmp.path(), &branch);
        let remote_url = tmp
            .path()
            .join("remote.git")
            .to_str()
            .expect("utf8")
            .to_string();
        let settings = GitSettings::new(&remote_url, &tmp.path().join("clone-b"), &branch);
        let repo_b = GitRepo::open_or_clone(settings).expect("clone b");

        repo_a
            .write_file("owners/platform/services/a.yaml", b"description: a\n")
            .expect("write a");
        repo_a.commit("META-8: update service a").expect("commit a");
        repo_a.push().expect("push a");

        repo_b
            .write_file("owners/platform/services/b.yaml", b"description: b\n")
            .expect("write b");
        repo_b.commit("META-9: update service b").expect("commit b");
        let err = repo_b.push().expect_err("push must be rejected");
        assert_eq!(err.kind(), custodian_core::ErrorKind::Concurrency);
    }
}
