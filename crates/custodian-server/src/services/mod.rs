// SPDX-License-Identifier: Apache-2.0

//! Business services for the three entity kinds. Validation runs before
//! the metadata lock is taken; every mutation then follows the same shape:
//! lock, full update, existence and referential checks, write through the
//! Updater.

mod owners;
mod repositories;
mod services;

use chrono::{DateTime, Utc};
use custodian_core::Error;

pub use owners::OwnerService;
pub use repositories::{RepositoryFilters, RepositoryService};
pub use services::ServiceService;

pub(crate) fn require_jira(jira: &Option<String>) -> Result<String, Error> {
    match jira {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(Error::validation("jiraIssue is required")),
    }
}

pub(crate) fn require_concurrency_tokens(
    time_stamp: Option<DateTime<Utc>>,
    commit_hash: &Option<String>,
) -> Result<(), Error> {
    if time_stamp.is_none() {
        return Err(Error::validation("timeStamp is required"));
    }
    match commit_hash {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(Error::validation("commitHash is required")),
    }
}

pub(crate) fn require_nonempty(value: &str, field: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(())
}
