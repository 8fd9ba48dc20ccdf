// SPDX-License-Identifier: Apache-2.0

use custodian_core::Error;
use git2::{FetchOptions, ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use std::path::{Path, PathBuf};

use crate::repo::credential_callbacks;

/// Read-only view of one revision of a remote repository, fetched into a
/// scratch directory without a checkout. Used by the pull-request
/// validator, which only needs blob contents at a candidate SHA.
pub struct RevisionTree {
    repo: Repository,
    commit_id: Oid,
}

impl std::fmt::Debug for RevisionTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `git2::Repository` is not `Debug`; omit it.
        f.debug_struct("RevisionTree")
            .field("commit_id", &self.commit_id)
            .finish_non_exhaustive()
    }
}

impl RevisionTree {
    pub fn fetch(
        remote_url: &str,
        sha: &str,
        workdir: &Path,
        ssh_key_path: Option<PathBuf>,
    ) -> Result<Self, Error> {
        let oid = Oid::from_str(sha)
            .map_err(|e| Error::bad_request(format!("invalid revision {sha}: {e}")))?;
        let repo = Repository::init(workdir)
            .map_err(|e| Error::internal(format!("init scratch repo failed: {e}")))?;
        {
            let mut remote = repo
                .remote_anonymous(remote_url)
                .map_err(|e| Error::internal(format!("remote setup failed: {e}")))?;
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(credential_callbacks(ssh_key_path.clone()));
            // Servers that refuse fetching a raw sha still serve their heads.
            if remote.fetch(&[sha], Some(&mut fetch), None).is_err() {
                let mut fetch = FetchOptions::new();
                fetch.remote_callbacks(credential_callbacks(ssh_key_path));
                remote
                    .fetch(
                        &["+refs/heads/*:refs/remotes/origin/*"],
                        Some(&mut fetch),
                        None,
                    )
                    .map_err(|e| Error::downstream(format!("fetch failed: {}", e.message())))?;
            }
        }
        repo.find_commit(oid)
            .map_err(|_| Error::not_found(format!("revision {sha} not found on remote")))?;
        Ok(Self {
            repo,
            commit_id: oid,
        })
    }

    /// Every blob path in the revision, sorted.
    pub fn paths(&self) -> Result<Vec<String>, Error> {
        let tree = self
            .repo
            .find_commit(self.commit_id)
            .and_then(|c| c.tree())
            .map_err(|e| Error::internal(format!("tree lookup failed: {e}")))?;
        let mut paths = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    paths.push(format!("{root}{name}"));
                }
            }
            TreeWalkResult::Ok
        })
        .map_err(|e| Error::internal(format!("tree walk failed: {e}")))?;
        paths.sort();
        Ok(paths)
    }

    /// Contents of one blob in the revision.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, Error> {
        let tree = self
            .repo
            .find_commit(self.commit_id)
            .and_then(|c| c.tree())
            .map_err(|e| Error::internal(format!("tree lookup failed: {e}")))?;
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|_| Error::not_found(format!("no blob at {path}")))?;
        let object = entry
            .to_object(&self.repo)
            .map_err(|e| Error::internal(format!("blob lookup failed: {e}")))?;
        let blob = object
            .as_blob()
            .ok_or_else(|| Error::not_found(format!("{path} is not a blob")))?;
        Ok(blob.content().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};
    use tempfile::tempdir;

    #[test]
    fn fetches_a_revision_and_reads_blobs() {
        let tmp = tempdir().expect("tempdir");
        let origin_dir = tmp.path().join("origin");
        let origin = Repository::init(&origin_dir).expect("init origin");
        std::fs::create_dir_all(origin_dir.join("owners/a")).expect("mkdir");
        std::fs::write(
            origin_dir.join("owners/a/owner.info.yaml"),
            "contact: a@example.com\n",
        )
        .expect("write");
        std::fs::write(origin_dir.join("README.md"), "hi\n").expect("write readme");
        let mut index = origin.index().expect("index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("add");
        index.write().expect("index write");
        let tree_id = index.write_tree().expect("tree");
        let tree = origin.find_tree(tree_id).expect("tree lookup");
        let sig = Signature::now("t", "t@example.com").expect("sig");
        let oid = origin
            .commit(Some("HEAD"), &sig, &sig, "META-1: seed", &tree, &[])
            .expect("commit");

        let scratch = tmp.path().join("scratch");
        let revision = RevisionTree::fetch(
            origin_dir.to_str().expect("utf8"),
            &oid.to_string(),
            &scratch,
            None,
        )
        .expect("fetch revision");
        let paths = revision.paths().expect("paths");
        assert!(paths.contains(&"owners/a/owner.info.yaml".to_string()));
        assert!(paths.contains(&"README.md".to_string()));
        let bytes = revision.read("owners/a/owner.info.yaml").expect("read");
        assert_eq!(bytes, b"contact: a@example.com\n");
    }

    #[test]
    fn unknown_revision_is_not_found() {
        let tmp = tempdir().expect("tempdir");
        let origin_dir = tmp.path().join("origin");
        let origin = Repository::init(&origin_dir).expect("init origin");
        std::fs::write(origin_dir.join("f.txt"), "x\n").expect("write");
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
            .expect("commit");

        let scratch = tmp.path().join("scratch");
        let missing = "0123456789012345678901234567890123456789";
        let err = RevisionTree::fetch(
            origin_dir.to_str().expect("utf8"),
            missing,
            &scratch,
            None,
        )
        .expect_err("missing revision");
        assert_eq!(err.kind(), custodian_core::ErrorKind::NotFound);
    }
}
