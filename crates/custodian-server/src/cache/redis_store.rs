// SPDX-License-Identifier: Apache-2.0

use crate::config::CacheSettings;
use custodian_core::Error;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Shared Redis connection for the metadata cache. Every operation is
/// bounded by the configured timeout; failures surface as downstream
/// errors rather than falling back silently, since Redis is authoritative
/// once configured.
pub struct RedisHandle {
    client: redis::Client,
    connection: Mutex<Option<redis::aio::MultiplexedConnection>>,
    prefix: String,
    entry_ttl: Duration,
    op_timeout: Duration,
}

impl RedisHandle {
    pub fn connect(url: &str, settings: &CacheSettings) -> Result<Self, Error> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::downstream(format!("redis client setup failed: {e}")))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            prefix: settings.redis_prefix.clone(),
            entry_ttl: settings.entry_ttl,
            op_timeout: settings.redis_op_timeout,
        })
    }

    fn key(&self, kind: &str, entry: &str) -> String {
        format!("{}:{kind}:{entry}", self.prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, Error> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }
        let connection = timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| Error::downstream("redis connect timed out"))?
        .map_err(|e| Error::downstream(format!("redis connect failed: {e}")))?;
        *slot = Some(connection.clone());
        Ok(connection)
    }

    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }

    pub async fn get(&self, kind: &str, entry: &str) -> Result<Option<String>, Error> {
        let mut connection = self.connection().await?;
        let key = self.key(kind, entry);
        match timeout(self.op_timeout, connection.get::<_, Option<String>>(key)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.reset_connection().await;
                Err(Error::downstream(format!("redis get failed: {e}")))
            }
            Err(_) => {
                self.reset_connection().await;
                Err(Error::downstream("redis get timed out"))
            }
        }
    }

    pub async fn put(&self, kind: &str, entry: &str, value: &str) -> Result<(), Error> {
        let mut connection = self.connection().await?;
        let key = self.key(kind, entry);
        let ttl = self.entry_ttl.as_secs();
        match timeout(
            self.op_timeout,
            connection.set_ex::<_, _, ()>(key, value, ttl),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.reset_connection().await;
                Err(Error::downstream(format!("redis set failed: {e}")))
            }
            Err(_) => {
                self.reset_connection().await;
                Err(Error::downstream("redis set timed out"))
            }
        }
    }

    pub async fn delete(&self, kind: &str, entry: &str) -> Result<(), Error> {
        let mut connection = self.connection().await?;
        let key = self.key(kind, entry);
        match timeout(self.op_timeout, connection.del::<_, ()>(key)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.reset_connection().await;
                Err(Error::downstream(format!("redis del failed: {e}")))
            }
            Err(_) => {
                self.reset_connection().await;
                Err(Error::downstream("redis del timed out"))
            }
        }
    }

    /// Entry names of a kind, without the key prefix, sorted.
    pub async fn keys(&self, kind: &str) -> Result<Vec<String>, Error> {
        let mut connection = self.connection().await?;
        let pattern = self.key(kind, "*");
        let scan = async {
            let mut iter = connection
                .scan_match::<_, String>(pattern)
                .await
                .map_err(|e| Error::downstream(format!("redis scan failed: {e}")))?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok::<Vec<String>, Error>(keys)
        };
        let keys = match timeout(self.op_timeout, scan).await {
            Ok(Ok(keys)) => keys,
            Ok(Err(e)) => {
                self.reset_connection().await;
                return Err(e);
            }
            Err(_) => {
                self.reset_connection().await;
                return Err(Error::downstream("redis scan timed out"));
            }
        };
        let strip = self.key(kind, "");
        let mut names: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&strip).map(str::to_string))
            .filter(|k| !k.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }
}
