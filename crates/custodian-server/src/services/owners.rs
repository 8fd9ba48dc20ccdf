// SPDX-License-Identifier: Apache-2.0

use super::{require_concurrency_tokens, require_jira, require_nonempty};
use crate::cache::MetadataCache;
use crate::config::RuntimeConfig;
use crate::updater::Updater;
use custodian_core::Error;
use custodian_model::{Owner, OwnerPatch};
use serde_json::json;
use std::sync::Arc;

pub struct OwnerService {
    updater: Arc<Updater>,
    cache: Arc<MetadataCache>,
    cfg: Arc<RuntimeConfig>,
}

impl OwnerService {
    #[must_use]
    pub fn new(updater: Arc<Updater>, cache: Arc<MetadataCache>, cfg: Arc<RuntimeConfig>) -> Self {
        Self {
            updater,
            cache,
            cfg,
        }
    }

    fn validate_shape(&self, owner: &Owner) -> Result<(), Error> {
        self.cfg.name_rules.validate_owner_alias(&owner.alias)?;
        require_nonempty(&owner.contact, "contact")?;
        require_jira(&owner.jira_issue)?;
        Ok(())
    }

    pub async fn get(&self, alias: &str) -> Result<Owner, Error> {
        self.cache
            .owners
            .get(alias)
            .await?
            .ok_or_else(|| Error::not_found(format!("owner {alias} not found")))
    }

    pub async fn list(&self) -> Result<Vec<Owner>, Error> {
        self.cache.all_owners().await
    }

    pub async fn create(&self, owner: Owner) -> Result<Owner, Error> {
        self.validate_shape(&owner)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if let Some(current) = self.cache.owners.get(&owner.alias).await? {
            return Err(
                Error::already_exists(format!("owner {} already exists", owner.alias))
                    .with_current(json!(current)),
            );
        }
        txn.write_owner(&owner).await
    }

    pub async fn update(&self, alias: &str, mut owner: Owner) -> Result<Owner, Error> {
        owner.alias = alias.to_string();
        self.validate_shape(&owner)?;
        require_concurrency_tokens(owner.time_stamp, &owner.commit_hash)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if self.cache.owners.get(alias).await?.is_none() {
            return Err(Error::not_found(format!("owner {alias} not found")));
        }
        txn.write_owner(&owner).await
    }

    pub async fn patch(&self, alias: &str, patch: OwnerPatch) -> Result<Owner, Error> {
        require_jira(&patch.jira_issue)?;
        require_concurrency_tokens(patch.time_stamp, &patch.commit_hash)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        let current = self
            .cache
            .owners
            .get(alias)
            .await?
            .ok_or_else(|| Error::not_found(format!("owner {alias} not found")))?;
        let merged = patch.apply(&current);
        self.validate_shape(&merged)?;
        txn.write_owner(&merged).await
    }

    pub async fn delete(&self, alias: &str, jira_issue: &str) -> Result<(), Error> {
        require_nonempty(jira_issue, "jiraIssue")?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if self.cache.owners.get(alias).await?.is_none() {
            return Err(Error::not_found(format!("owner {alias} not found")));
        }
        txn.delete_owner(alias, jira_issue).await
    }
}
