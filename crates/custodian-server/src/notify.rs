// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use custodian_core::Error;
use custodian_model::ChangeEvent;
use tracing::info;

/// Outbound change-notification channel, seen only at its interface. The
/// committed change is the source of truth; notifier failures are logged
/// by the caller and never rolled back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn entity_changed(&self, event: &ChangeEvent) -> Result<(), Error>;
}

/// Default notifier: structured log lines only.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn entity_changed(&self, event: &ChangeEvent) -> Result<(), Error> {
        info!(
            kind = %event.kind,
            key = %event.key,
            commit_hash = %event.commit_hash,
            "entity changed"
        );
        Ok(())
    }
}

/// Forwards change events to a subscriber endpoint.
pub struct HttpNotifier {
    http: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn entity_changed(&self, event: &ChangeEvent) -> Result<(), Error> {
        let response = self
            .http
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::downstream(format!("notify failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::downstream(format!(
                "notify returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
