// SPDX-License-Identifier: Apache-2.0

use super::{require_concurrency_tokens, require_jira, require_nonempty};
use crate::cache::MetadataCache;
use crate::config::RuntimeConfig;
use crate::updater::Updater;
use custodian_core::Error;
use custodian_model::{validate_ssh_url, Repository, RepositoryPatch};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Listing filters of the repositories collection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryFilters {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub repo_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

pub struct RepositoryService {
    updater: Arc<Updater>,
    cache: Arc<MetadataCache>,
    cfg: Arc<RuntimeConfig>,
}

impl RepositoryService {
    #[must_use]
    pub fn new(updater: Arc<Updater>, cache: Arc<MetadataCache>, cfg: Arc<RuntimeConfig>) -> Self {
        Self {
            updater,
            cache,
            cfg,
        }
    }

    fn validate_shape(&self, repository: &Repository) -> Result<(), Error> {
        self.cfg
            .name_rules
            .validate_repository_key(&repository.key)?;
        require_nonempty(&repository.owner, "owner")?;
        validate_ssh_url(&repository.url)?;
        require_jira(&repository.jira_issue)?;
        Ok(())
    }

    async fn check_references(&self, repository: &Repository) -> Result<(), Error> {
        if self.cache.owners.get(&repository.owner).await?.is_none() {
            return Err(Error::validation(format!(
                "owner {} does not exist",
                repository.owner
            )));
        }
        // The url is globally unique across every repository record.
        for other in self.cache.all_repositories().await? {
            if other.key != repository.key && other.url == repository.url {
                return Err(
                    Error::already_exists(format!("url already used by {}", other.key))
                        .with_current(json!(other)),
                );
            }
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Repository, Error> {
        self.cache
            .repositories
            .get(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("repository {key} not found")))
    }

    pub async fn list(&self, filters: &RepositoryFilters) -> Result<Vec<Repository>, Error> {
        let service_keys = match &filters.service {
            Some(service_name) => {
                let service = self
                    .cache
                    .services
                    .get(service_name)
                    .await?
                    .ok_or_else(|| {
                        Error::not_found(format!("service {service_name} not found"))
                    })?;
                Some(service.repository_keys().to_vec())
            }
            None => None,
        };
        let mut out = Vec::new();
        for repository in self.cache.all_repositories().await? {
            if let Some(owner) = &filters.owner {
                if &repository.owner != owner {
                    continue;
                }
            }
            if let Some(name) = &filters.name {
                if repository.name() != name {
                    continue;
                }
            }
            if let Some(repo_type) = &filters.repo_type {
                if repository.repo_type() != repo_type {
                    continue;
                }
            }
            if let Some(url) = &filters.url {
                if &repository.url != url {
                    continue;
                }
            }
            if let Some(keys) = &service_keys {
                if !keys.contains(&repository.key) {
                    continue;
                }
            }
            out.push(repository);
        }
        Ok(out)
    }

    pub async fn create(&self, repository: Repository) -> Result<Repository, Error> {
        self.validate_shape(&repository)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if let Some(current) = self.cache.repositories.get(&repository.key).await? {
            return Err(Error::already_exists(format!(
                "repository {} already exists",
                repository.key
            ))
            .with_current(json!(current)));
        }
        self.check_references(&repository).await?;
        let key = repository.key.clone();
        txn.write_repository(&key, &repository).await
    }

    pub async fn update(&self, key: &str, mut repository: Repository) -> Result<Repository, Error> {
        repository.key = key.to_string();
        self.validate_shape(&repository)?;
        require_concurrency_tokens(repository.time_stamp, &repository.commit_hash)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if self.cache.repositories.get(key).await?.is_none() {
            return Err(Error::not_found(format!("repository {key} not found")));
        }
        self.check_references(&repository).await?;
        txn.write_repository(key, &repository).await
    }

    pub async fn patch(&self, key: &str, patch: RepositoryPatch) -> Result<Repository, Error> {
        require_jira(&patch.jira_issue)?;
        require_concurrency_tokens(patch.time_stamp, &patch.commit_hash)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        let current = self
            .cache
            .repositories
            .get(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("repository {key} not found")))?;
        let merged = patch.apply(&current);
        self.validate_shape(&merged)?;
        self.check_references(&merged).await?;
        txn.write_repository(key, &merged).await
    }

    pub async fn delete(&self, key: &str, jira_issue: &str) -> Result<(), Error> {
        require_nonempty(jira_issue, "jiraIssue")?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        txn.delete_repository(key, jira_issue).await
    }
}
