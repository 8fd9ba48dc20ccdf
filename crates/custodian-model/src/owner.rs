// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An administrative grouping (team) that owns services and repositories.
///
/// `alias` is derived from the directory name under `owners/`; the audit
/// fields are stamped from the git commit that produced the current state
/// and double as the optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Owner {
    pub alias: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_jira_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_issue: Option<String>,
}

impl Owner {
    /// Members of a named group, if the owner defines it.
    #[must_use]
    pub fn group_members(&self, group: &str) -> Option<&[String]> {
        self.groups
            .as_ref()
            .and_then(|g| g.get(group))
            .map(Vec::as_slice)
    }
}
