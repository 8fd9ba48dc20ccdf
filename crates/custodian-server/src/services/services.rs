// SPDX-License-Identifier: Apache-2.0

use super::{require_concurrency_tokens, require_jira, require_nonempty};
use crate::cache::MetadataCache;
use crate::config::RuntimeConfig;
use crate::updater::Updater;
use custodian_core::Error;
use custodian_model::{dedup_sorted, Service, ServicePatch};
use serde_json::json;
use std::sync::Arc;

pub struct ServiceService {
    updater: Arc<Updater>,
    cache: Arc<MetadataCache>,
    cfg: Arc<RuntimeConfig>,
}

impl ServiceService {
    #[must_use]
    pub fn new(updater: Arc<Updater>, cache: Arc<MetadataCache>, cfg: Arc<RuntimeConfig>) -> Self {
        Self {
            updater,
            cache,
            cfg,
        }
    }

    fn validate_shape(&self, service: &Service) -> Result<(), Error> {
        self.cfg.name_rules.validate_service_name(&service.name)?;
        require_nonempty(&service.owner, "owner")?;
        require_nonempty(&service.description, "description")?;
        require_jira(&service.jira_issue)?;
        for key in service.repository_keys() {
            self.cfg.name_rules.validate_repository_key(key)?;
        }
        Ok(())
    }

    /// Owner must exist, and every referenced repository must exist under
    /// the owner the files currently live with.
    async fn check_references(
        &self,
        service: &Service,
        repositories_under: &str,
    ) -> Result<(), Error> {
        if self.cache.owners.get(&service.owner).await?.is_none() {
            return Err(Error::validation(format!(
                "owner {} does not exist",
                service.owner
            )));
        }
        if repositories_under != service.owner
            && self
                .cache
                .owners
                .get(repositories_under)
                .await?
                .is_none()
        {
            return Err(Error::validation(format!(
                "owner {repositories_under} does not exist"
            )));
        }
        for key in service.repository_keys() {
            let repository = self
                .cache
                .repositories
                .get(key)
                .await?
                .ok_or_else(|| Error::validation(format!("repository {key} does not exist")))?;
            if repository.owner != repositories_under {
                return Err(Error::validation(format!(
                    "repository {key} belongs to {} and not to {repositories_under}",
                    repository.owner
                )));
            }
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Service, Error> {
        self.cache
            .services
            .get(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {name} not found")))
    }

    pub async fn list(&self) -> Result<Vec<Service>, Error> {
        self.cache.all_services().await
    }

    pub async fn create(&self, service: Service) -> Result<Service, Error> {
        self.validate_shape(&service)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if let Some(current) = self.cache.services.get(&service.name).await? {
            return Err(
                Error::already_exists(format!("service {} already exists", service.name))
                    .with_current(json!(current)),
            );
        }
        self.check_references(&service, &service.owner).await?;
        let name = service.name.clone();
        txn.write_service(&name, &service).await
    }

    pub async fn update(&self, name: &str, mut service: Service) -> Result<Service, Error> {
        service.name = name.to_string();
        self.validate_shape(&service)?;
        require_concurrency_tokens(service.time_stamp, &service.commit_hash)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        let current = self
            .cache
            .services
            .get(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {name} not found")))?;
        // On an owner move the referenced repositories still live with the
        // current owner; they are dragged along in the same commit.
        self.check_references(&service, &current.owner).await?;
        txn.write_service(name, &service).await
    }

    pub async fn patch(&self, name: &str, patch: ServicePatch) -> Result<Service, Error> {
        require_jira(&patch.jira_issue)?;
        require_concurrency_tokens(patch.time_stamp, &patch.commit_hash)?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        let current = self
            .cache
            .services
            .get(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {name} not found")))?;
        let merged = patch.apply(&current);
        self.validate_shape(&merged)?;
        self.check_references(&merged, &current.owner).await?;
        txn.write_service(name, &merged).await
    }

    pub async fn delete(&self, name: &str, jira_issue: &str) -> Result<(), Error> {
        require_nonempty(jira_issue, "jiraIssue")?;
        let mut txn = self.updater.lock().await;
        txn.perform_full_update().await?;
        if self.cache.services.get(name).await?.is_none() {
            return Err(Error::not_found(format!("service {name} not found")));
        }
        txn.delete_service(name, jira_issue).await
    }

    /// Sorted unique union of the configured default promoters, the given
    /// owner's promoters, every configured additional owner's promoters,
    /// and all owners' product owners.
    pub async fn promoters_for_owner(&self, alias: &str) -> Result<Vec<String>, Error> {
        let owner = self
            .cache
            .owners
            .get(alias)
            .await?
            .ok_or_else(|| Error::not_found(format!("owner {alias} not found")))?;
        let mut promoters = self.cfg.default_promoters.clone();
        promoters.extend(owner.promoters.clone().unwrap_or_default());
        for additional in &self.cfg.additional_promoter_owners {
            if let Some(additional_owner) = self.cache.owners.get(additional).await? {
                promoters.extend(additional_owner.promoters.unwrap_or_default());
            }
        }
        for any_owner in self.cache.all_owners().await? {
            if let Some(product_owner) = any_owner.product_owner {
                promoters.push(product_owner);
            }
        }
        Ok(dedup_sorted(promoters))
    }

    /// Promoters resolved through the owning service.
    pub async fn promoters(&self, service_name: &str) -> Result<Vec<String>, Error> {
        let service = self.get(service_name).await?;
        self.promoters_for_owner(&service.owner).await
    }
}
