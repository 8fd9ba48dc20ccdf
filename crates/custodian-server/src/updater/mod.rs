// SPDX-License-Identifier: Apache-2.0

//! The single-writer serialisation layer. One process-wide mutex guards
//! the working copy and every cache mutation; holding a [`MetadataTxn`]
//! IS the lock-held marker, so inner calls cannot re-acquire or bypass it.

use crate::cache::MetadataCache;
use crate::mapper::Mapper;
use crate::notify::Notifier;
use chrono::Utc;
use custodian_core::Error;
use custodian_model::{ChangeEvent, EntityKind, Owner, Repository, Service, UpdateEvent};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{error, info, warn};

pub struct Updater {
    mapper: Mutex<Mapper>,
    cache: Arc<MetadataCache>,
    notifier: Arc<dyn Notifier>,
    events_started: AtomicBool,
}

impl Updater {
    #[must_use]
    pub fn new(mapper: Mapper, cache: Arc<MetadataCache>, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self {
            mapper: Mutex::new(mapper),
            cache,
            notifier,
            events_started: AtomicBool::new(false),
        })
    }

    /// Acquires the metadata lock. All git-touching work happens through
    /// the returned transaction; the lock releases when it drops,
    /// regardless of errors.
    pub async fn lock(&self) -> MetadataTxn<'_> {
        MetadataTxn {
            mapper: self.mapper.lock().await,
            cache: &self.cache,
            notifier: self.notifier.as_ref(),
        }
    }

    /// Begins consuming external update events. Safe to call once the
    /// initial cache population finished; repeated calls are ignored.
    pub fn start_receiving_events(self: &Arc<Self>, mut events: mpsc::Receiver<UpdateEvent>) {
        if self.events_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let updater = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut txn = updater.lock().await;
                if !txn.contains_new_information(&event) {
                    continue;
                }
                info!(commit_hash = %event.commit_hash, "external update event");
                if let Err(e) = txn.perform_full_update_with_notifications().await {
                    error!(error = %e, "event-driven update failed");
                }
            }
        });
    }
}

/// A held metadata lock with access to the working copy, the cache, and
/// the notifier.
pub struct MetadataTxn<'a> {
    mapper: MutexGuard<'a, Mapper>,
    cache: &'a MetadataCache,
    notifier: &'a dyn Notifier,
}

fn tokens_match(
    supplied_stamp: Option<chrono::DateTime<chrono::Utc>>,
    supplied_hash: Option<&str>,
    current_stamp: Option<chrono::DateTime<chrono::Utc>>,
    current_hash: Option<&str>,
) -> bool {
    supplied_stamp == current_stamp && supplied_hash == current_hash
}

impl MetadataTxn<'_> {
    #[must_use]
    pub fn contains_new_information(&self, event: &UpdateEvent) -> bool {
        self.mapper.contains_new_information(event)
    }

    pub async fn perform_full_update(&mut self) -> Result<(), Error> {
        self.full_update(false).await
    }

    pub async fn perform_full_update_with_notifications(&mut self) -> Result<(), Error> {
        self.full_update(true).await
    }

    async fn full_update(&mut self, notify: bool) -> Result<(), Error> {
        let events = self.mapper.refresh_metadata()?;
        let cold = self.cache.owners.get_list_timestamp().await?.is_none();
        if cold {
            self.rescan_all().await?;
        } else {
            for event in &events {
                self.apply_event(event, notify).await?;
            }
        }
        let now = Utc::now();
        self.cache.owners.set_list_timestamp(now).await?;
        self.cache.services.set_list_timestamp(now).await?;
        self.cache.repositories.set_list_timestamp(now).await?;
        Ok(())
    }

    /// Full disk scan: every entity present on disk is (re)cached and
    /// every cached key with no file behind it is dropped.
    async fn rescan_all(&mut self) -> Result<(), Error> {
        let aliases = self.mapper.sorted_owner_aliases()?;
        for alias in &aliases {
            let owner = self.mapper.get_owner(alias)?;
            self.cache.owners.put(alias, owner).await?;
        }
        for cached in self.cache.owners.keys().await? {
            if !aliases.contains(&cached) {
                self.cache.owners.delete(&cached).await?;
            }
        }

        let services = self.mapper.service_owner_index()?;
        for (name, alias) in &services {
            let service = self.mapper.get_service(alias, name)?;
            self.cache.services.put(name, service).await?;
        }
        for cached in self.cache.services.keys().await? {
            if !services.contains_key(&cached) {
                self.cache.services.delete(&cached).await?;
            }
        }

        let repositories = self.mapper.repository_owner_index()?;
        for (key, alias) in &repositories {
            let repository = self.mapper.get_repository(alias, key)?;
            self.cache.repositories.put(key, repository).await?;
        }
        for cached in self.cache.repositories.keys().await? {
            if !repositories.contains_key(&cached) {
                self.cache.repositories.delete(&cached).await?;
            }
        }
        info!(
            owners = aliases.len(),
            services = services.len(),
            repositories = repositories.len(),
            "full metadata scan complete"
        );
        Ok(())
    }

    async fn apply_event(&mut self, event: &UpdateEvent, notify: bool) -> Result<(), Error> {
        for alias in &event.owner_aliases {
            match self.mapper.get_owner(alias) {
                Ok(owner) => self.cache.owners.put(alias, owner).await?,
                Err(e) if e.kind() == custodian_core::ErrorKind::NotFound => {
                    self.cache.owners.delete(alias).await?;
                }
                Err(e) => return Err(e),
            }
            if notify {
                Self::notify(self.notifier,EntityKind::Owner, alias, event).await;
            }
        }
        let service_index = self.mapper.service_owner_index()?;
        for name in &event.service_names {
            match service_index.get(name) {
                Some(alias) => {
                    let service = self.mapper.get_service(alias, name)?;
                    self.cache.services.put(name, service).await?;
                }
                None => self.cache.services.delete(name).await?,
            }
            if notify {
                Self::notify(self.notifier,EntityKind::Service, name, event).await;
            }
        }
        let repository_index = self.mapper.repository_owner_index()?;
        for key in &event.repository_keys {
            match repository_index.get(key) {
                Some(alias) => {
                    let repository = self.mapper.get_repository(alias, key)?;
                    self.cache.repositories.put(key, repository).await?;
                }
                None => self.cache.repositories.delete(key).await?,
            }
            if notify {
                Self::notify(self.notifier,EntityKind::Repository, key, event).await;
            }
        }
        Ok(())
    }

    async fn notify(notifier: &dyn Notifier, kind: EntityKind, key: &str, event: &UpdateEvent) {
        let change = ChangeEvent {
            kind,
            key: key.to_string(),
            commit_hash: event.commit_hash.clone(),
            time_stamp: event.time_stamp,
        };
        if let Err(e) = notifier.entity_changed(&change).await {
            warn!(error = %e, key, "change notification failed");
        }
    }

    async fn notify_entity(
        notifier: &dyn Notifier,
        kind: EntityKind,
        key: &str,
        commit_hash: Option<&str>,
        time_stamp: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        let change = ChangeEvent {
            kind,
            key: key.to_string(),
            commit_hash: commit_hash.unwrap_or_default().to_string(),
            time_stamp: time_stamp.unwrap_or(chrono::DateTime::<Utc>::UNIX_EPOCH),
        };
        if let Err(e) = notifier.entity_changed(&change).await {
            warn!(error = %e, key, "change notification failed");
        }
    }

    /// True iff no service or repository currently lists this owner.
    async fn can_delete_owner(cache: &MetadataCache, alias: &str) -> Result<bool, Error> {
        for service in cache.all_services().await? {
            if service.owner == alias {
                return Ok(false);
            }
        }
        for repository in cache.all_repositories().await? {
            if repository.owner == alias {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True iff no service's repository list contains the key.
    async fn can_move_or_delete_repository(cache: &MetadataCache, key: &str) -> Result<bool, Error> {
        for service in cache.all_services().await? {
            if service.references_repository(key) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn concurrency_conflict<T: serde::Serialize>(current: &T) -> Error {
        Error::concurrency("record changed since it was read")
            .with_current(json!(current))
    }

    fn with_current_if_conflict(err: Error, current: Option<serde_json::Value>) -> Error {
        if err.kind() == custodian_core::ErrorKind::Concurrency {
            if let Some(current) = current {
                return err.with_current(current);
            }
        }
        err
    }

    pub async fn write_owner(&mut self, owner: &Owner) -> Result<Owner, Error> {
        if let Some(current) = self.cache.owners.get(&owner.alias).await? {
            if !tokens_match(
                owner.time_stamp,
                owner.commit_hash.as_deref(),
                current.time_stamp,
                current.commit_hash.as_deref(),
            ) {
                return Err(Self::concurrency_conflict(&current));
            }
        }
        let stamped = match self.mapper.write_owner(owner) {
            Ok(stamped) => stamped,
            Err(e) => {
                let err = self.refresh_after_conflict(e).await;
                let current = self
                    .cache
                    .owners
                    .get(&owner.alias)
                    .await
                    .ok()
                    .flatten()
                    .map(|c| json!(c));
                return Err(Self::with_current_if_conflict(err, current));
            }
        };
        self.cache.owners.put(&stamped.alias, stamped.clone()).await?;
        Self::notify_entity(self.notifier,
            EntityKind::Owner,
            &stamped.alias,
            stamped.commit_hash.as_deref(),
            stamped.time_stamp,
        )
        .await;
        Ok(stamped)
    }

    pub async fn delete_owner(&mut self, alias: &str, jira: &str) -> Result<(), Error> {
        if !Self::can_delete_owner(self.cache, alias).await? {
            return Err(Error::referenced(format!(
                "owner {alias} still owns services or repositories"
            )));
        }
        let info = self.mapper.delete_owner(alias, jira)?;
        self.cache.owners.delete(alias).await?;
        Self::notify_entity(self.notifier,
            EntityKind::Owner,
            alias,
            Some(&info.commit_hash),
            Some(info.time_stamp),
        )
        .await;
        Ok(())
    }

    pub async fn write_service(&mut self, name: &str, service: &Service) -> Result<Service, Error> {
        let current = self.cache.services.get(name).await?;
        if let Some(current) = &current {
            if !tokens_match(
                service.time_stamp,
                service.commit_hash.as_deref(),
                current.time_stamp,
                current.commit_hash.as_deref(),
            ) {
                return Err(Self::concurrency_conflict(current));
            }
        }
        let moving = current
            .as_ref()
            .is_some_and(|c| c.owner != service.owner);
        let write_result = if moving {
            self.mapper.write_service_with_changed_owner(name, service)
        } else {
            self.mapper.write_service(service)
        };
        let stamped = match write_result {
            Ok(stamped) => stamped,
            Err(e) => {
                let err = self.refresh_after_conflict(e).await;
                let current = self
                    .cache
                    .services
                    .get(name)
                    .await
                    .ok()
                    .flatten()
                    .map(|c| json!(c));
                return Err(Self::with_current_if_conflict(err, current));
            }
        };
        self.cache.services.put(name, stamped.clone()).await?;
        if moving {
            // The referenced repositories moved in the same commit.
            for key in stamped.repository_keys() {
                let repository = self.mapper.get_repository(&stamped.owner, key)?;
                self.cache.repositories.put(key, repository.clone()).await?;
                Self::notify_entity(self.notifier,
                    EntityKind::Repository,
                    key,
                    repository.commit_hash.as_deref(),
                    repository.time_stamp,
                )
                .await;
            }
        }
        Self::notify_entity(self.notifier,
            EntityKind::Service,
            name,
            stamped.commit_hash.as_deref(),
            stamped.time_stamp,
        )
        .await;
        Ok(stamped)
    }

    pub async fn delete_service(&mut self, name: &str, jira: &str) -> Result<(), Error> {
        let current = self
            .cache
            .services
            .get(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("service {name} not found")))?;
        let info = self.mapper.delete_service(&current.owner, name, jira)?;
        self.cache.services.delete(name).await?;
        Self::notify_entity(self.notifier,
            EntityKind::Service,
            name,
            Some(&info.commit_hash),
            Some(info.time_stamp),
        )
        .await;
        Ok(())
    }

    pub async fn write_repository(
        &mut self,
        key: &str,
        repository: &Repository,
    ) -> Result<Repository, Error> {
        let current = self.cache.repositories.get(key).await?;
        if let Some(current) = &current {
            if !tokens_match(
                repository.time_stamp,
                repository.commit_hash.as_deref(),
                current.time_stamp,
                current.commit_hash.as_deref(),
            ) {
                return Err(Self::concurrency_conflict(current));
            }
        }
        let moving = current
            .as_ref()
            .is_some_and(|c| c.owner != repository.owner);
        if moving && !Self::can_move_or_delete_repository(self.cache, key).await? {
            return Err(Error::referenced(format!(
                "repository {key} is still referenced by a service"
            )));
        }
        let write_result = if moving {
            self.mapper
                .write_repository_with_changed_owner(key, repository)
        } else {
            self.mapper.write_repository(repository)
        };
        let stamped = match write_result {
            Ok(stamped) => stamped,
            Err(e) => {
                let err = self.refresh_after_conflict(e).await;
                let current = self
                    .cache
                    .repositories
                    .get(key)
                    .await
                    .ok()
                    .flatten()
                    .map(|c| json!(c));
                return Err(Self::with_current_if_conflict(err, current));
            }
        };
        self.cache
            .repositories
            .put(key, stamped.clone())
            .await?;
        Self::notify_entity(self.notifier,
            EntityKind::Repository,
            key,
            stamped.commit_hash.as_deref(),
            stamped.time_stamp,
        )
        .await;
        Ok(stamped)
    }

    pub async fn delete_repository(&mut self, key: &str, jira: &str) -> Result<(), Error> {
        let current = self
            .cache
            .repositories
            .get(key)
            .await?
            .ok_or_else(|| Error::not_found(format!("repository {key} not found")))?;
        if !Self::can_move_or_delete_repository(self.cache, key).await? {
            return Err(Error::referenced(format!(
                "repository {key} is still referenced by a service"
            )));
        }
        let info = self.mapper.delete_repository(&current.owner, key, jira)?;
        self.cache.repositories.delete(key).await?;
        Self::notify_entity(self.notifier,
            EntityKind::Repository,
            key,
            Some(&info.commit_hash),
            Some(info.time_stamp),
        )
        .await;
        Ok(())
    }

    /// A rejected push means someone else pushed between our pull and
    /// push. The working copy was already re-cloned, so the pulled-commit
    /// delta is gone; a full rescan brings the cache to the true head and
    /// lets the caller see current records.
    async fn refresh_after_conflict(&mut self, err: Error) -> Error {
        if err.kind() == custodian_core::ErrorKind::Concurrency {
            if let Err(refresh_err) = self.rescan_all().await {
                warn!(error = %refresh_err, "refresh after push conflict failed");
            }
        }
        err
    }
}
