// SPDX-License-Identifier: Apache-2.0

//! Keyed per-kind stores for owner, service, and repository records.
//!
//! Readers always receive deep copies: entries are owned values and every
//! `get` clones, so no mutable storage is shared with callers. Each
//! operation is atomic with respect to any other operation on the same
//! kind. The cache is eventually consistent with git; readers may still
//! observe an entry that was just deleted.

mod redis_store;

use crate::config::CacheSettings;
use chrono::{DateTime, Utc};
use custodian_core::Error;
use custodian_model::{Owner, Repository, Service};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub use redis_store::RedisHandle;

const LIST_STAMP_ENTRY: &str = ".list-stamp";

pub struct KindStore<T> {
    kind: &'static str,
    entries: Mutex<BTreeMap<String, T>>,
    list_stamp: Mutex<Option<DateTime<Utc>>>,
    redis: Option<Arc<RedisHandle>>,
}

impl<T> KindStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    fn new(kind: &'static str, redis: Option<Arc<RedisHandle>>) -> Self {
        Self {
            kind,
            entries: Mutex::new(BTreeMap::new()),
            list_stamp: Mutex::new(None),
            redis,
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, T>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_stamp(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.list_stamp
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>, Error> {
        if let Some(redis) = &self.redis {
            let Some(raw) = redis.get(self.kind, key).await? else {
                return Ok(None);
            };
            let value = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("cache entry decode failed: {e}")))?;
            return Ok(Some(value));
        }
        Ok(self.lock_entries().get(key).cloned())
    }

    pub async fn put(&self, key: &str, value: T) -> Result<(), Error> {
        if let Some(redis) = &self.redis {
            let raw = serde_json::to_string(&value)
                .map_err(|e| Error::internal(format!("cache entry encode failed: {e}")))?;
            return redis.put(self.kind, key, &raw).await;
        }
        self.lock_entries().insert(key.to_string(), value);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        if let Some(redis) = &self.redis {
            return redis.delete(self.kind, key).await;
        }
        self.lock_entries().remove(key);
        Ok(())
    }

    /// Sorted keys of the kind.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        if let Some(redis) = &self.redis {
            return redis.keys(self.kind).await;
        }
        Ok(self.lock_entries().keys().cloned().collect())
    }

    pub async fn set_list_timestamp(&self, stamp: DateTime<Utc>) -> Result<(), Error> {
        if let Some(redis) = &self.redis {
            return redis
                .put(self.kind, LIST_STAMP_ENTRY, &stamp.to_rfc3339())
                .await;
        }
        *self.lock_stamp() = Some(stamp);
        Ok(())
    }

    pub async fn get_list_timestamp(&self) -> Result<Option<DateTime<Utc>>, Error> {
        if let Some(redis) = &self.redis {
            let Some(raw) = redis.get(self.kind, LIST_STAMP_ENTRY).await? else {
                return Ok(None);
            };
            let stamp = DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| Error::internal(format!("list timestamp decode failed: {e}")))?;
            return Ok(Some(stamp.with_timezone(&Utc)));
        }
        Ok(*self.lock_stamp())
    }
}

/// The three per-kind stores plus their freshness stamps.
pub struct MetadataCache {
    pub owners: KindStore<Owner>,
    pub services: KindStore<Service>,
    pub repositories: KindStore<Repository>,
}

impl MetadataCache {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            owners: KindStore::new("owner", None),
            services: KindStore::new("service", None),
            repositories: KindStore::new("repository", None),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Result<Self, Error> {
        let Some(url) = &settings.redis_url else {
            return Ok(Self::in_memory());
        };
        let handle = Arc::new(RedisHandle::connect(url, settings)?);
        Ok(Self {
            owners: KindStore::new("owner", Some(Arc::clone(&handle))),
            services: KindStore::new("service", Some(Arc::clone(&handle))),
            repositories: KindStore::new("repository", Some(handle)),
        })
    }

    /// Listing snapshot of every service, used for referential checks.
    pub async fn all_services(&self) -> Result<Vec<Service>, Error> {
        let mut out = Vec::new();
        for name in self.services.keys().await? {
            // Deleted between listing and read is benign; skip.
            if let Some(service) = self.services.get(&name).await? {
                out.push(service);
            }
        }
        Ok(out)
    }

    pub async fn all_owners(&self) -> Result<Vec<Owner>, Error> {
        let mut out = Vec::new();
        for alias in self.owners.keys().await? {
            if let Some(owner) = self.owners.get(&alias).await? {
                out.push(owner);
            }
        }
        Ok(out)
    }

    pub async fn all_repositories(&self) -> Result<Vec<Repository>, Error> {
        let mut out = Vec::new();
        for key in self.repositories.keys().await? {
            if let Some(repository) = self.repositories.get(&key).await? {
                out.push(repository);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_owner(alias: &str) -> Owner {
        Owner {
            alias: alias.to_string(),
            contact: "team@example.com".to_string(),
            product_owner: None,
            default_jira_project: None,
            groups: Some(BTreeMap::from([(
                "admins".to_string(),
                vec!["alice".to_string()],
            )])),
            display_name: None,
            promoters: None,
            time_stamp: None,
            commit_hash: None,
            jira_issue: None,
        }
    }

    #[tokio::test]
    async fn get_returns_a_deep_copy() {
        let cache = MetadataCache::in_memory();
        cache
            .owners
            .put("platform", sample_owner("platform"))
            .await
            .expect("put");
        let mut copy = cache
            .owners
            .get("platform")
            .await
            .expect("get")
            .expect("present");
        copy.groups
            .as_mut()
            .expect("groups")
            .get_mut("admins")
            .expect("admins")
            .push("mallory".to_string());
        let fresh = cache
            .owners
            .get("platform")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(
            fresh.group_members("admins"),
            Some(&["alice".to_string()][..])
        );
    }

    #[tokio::test]
    async fn keys_are_sorted_and_delete_is_final() {
        let cache = MetadataCache::in_memory();
        cache
            .owners
            .put("zeta", sample_owner("zeta"))
            .await
            .expect("put");
        cache
            .owners
            .put("alpha", sample_owner("alpha"))
            .await
            .expect("put");
        assert_eq!(
            cache.owners.keys().await.expect("keys"),
            vec!["alpha".to_string(), "zeta".to_string()]
        );
        cache.owners.delete("alpha").await.expect("delete");
        assert_eq!(cache.owners.get("alpha").await.expect("get"), None);
    }

    #[tokio::test]
    async fn list_timestamp_round_trips() {
        let cache = MetadataCache::in_memory();
        assert_eq!(
            cache.owners.get_list_timestamp().await.expect("stamp"),
            None
        );
        let now = Utc::now();
        cache
            .owners
            .set_list_timestamp(now)
            .await
            .expect("set stamp");
        assert_eq!(
            cache.owners.get_list_timestamp().await.expect("stamp"),
            Some(now)
        );
    }
}
