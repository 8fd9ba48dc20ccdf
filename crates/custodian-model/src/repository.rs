// SPDX-License-Identifier: Apache-2.0

use crate::configuration::Configuration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The branch regarded as authoritative for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mainline {
    Master,
    Main,
    Develop,
}

impl Mainline {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Main => "main",
            Self::Develop => "develop",
        }
    }
}

impl fmt::Display for Mainline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A git repository with metadata-managed configuration, keyed `<name>.<type>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Repository {
    pub key: String,
    pub owner: String,
    pub url: String,
    pub mainline: Mainline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unittest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_issue: Option<String>,
}

impl Repository {
    /// Splits the key into its `(name, type)` halves at the last separator.
    #[must_use]
    pub fn split_key(key: &str) -> Option<(&str, &str)> {
        key.rsplit_once('.')
    }

    #[must_use]
    pub fn name(&self) -> &str {
        Self::split_key(&self.key).map_or(self.key.as_str(), |(n, _)| n)
    }

    #[must_use]
    pub fn repo_type(&self) -> &str {
        Self::split_key(&self.key).map_or("", |(_, t)| t)
    }
}
