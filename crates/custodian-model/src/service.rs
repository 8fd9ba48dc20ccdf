// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Workload,
    Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequiredScan {
    Sast,
    Sca,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Quicklink {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A logical deliverable owned by one owner, aggregating repository keys.
///
/// Every key in `repositories` must name a repository under the same owner;
/// the move workflows keep that coupling intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Service {
    pub name: String,
    pub owner: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quicklinks: Option<Vec<Quicklink>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<OperationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_scans: Option<Vec<RequiredScan>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_issue: Option<String>,
}

impl Service {
    #[must_use]
    pub fn repository_keys(&self) -> &[String] {
        self.repositories.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn references_repository(&self, key: &str) -> bool {
        self.repository_keys().iter().any(|k| k == key)
    }
}
