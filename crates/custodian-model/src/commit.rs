// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommitInfo {
    pub commit_hash: String,
    pub time_stamp: DateTime<Utc>,
    pub message: String,
    pub files_changed: Vec<String>,
}

/// Sets of entities affected by one pulled commit, derived from the
/// filenames it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateEvent {
    pub commit_hash: String,
    pub time_stamp: DateTime<Utc>,
    #[serde(default)]
    pub owner_aliases: BTreeSet<String>,
    #[serde(default)]
    pub service_names: BTreeSet<String>,
    #[serde(default)]
    pub repository_keys: BTreeSet<String>,
}

impl Default for CommitInfo {
    fn default() -> Self {
        Self {
            commit_hash: String::new(),
            time_stamp: DateTime::<Utc>::UNIX_EPOCH,
            message: String::new(),
            files_changed: Vec::new(),
        }
    }
}

impl UpdateEvent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owner_aliases.is_empty()
            && self.service_names.is_empty()
            && self.repository_keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Owner,
    Service,
    Repository,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Service => write!(f, "service"),
            Self::Repository => write!(f, "repository"),
        }
    }
}

/// One outbound change notification per written or deleted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub key: String,
    pub commit_hash: String,
    pub time_stamp: DateTime<Utc>,
}

/// Extracts the jira issue from a commit message: a leading
/// `Pull request #<n>: ` prefix is stripped, then the first `[A-Z0-9-]+`
/// token longer than one character wins.
#[must_use]
pub fn extract_jira_issue(message: &str) -> Option<String> {
    let stripped = Regex::new(r"^Pull request #\d+: ")
        .ok()?
        .replace(message, "");
    Regex::new(r"[A-Z0-9-]{2,}")
        .ok()?
        .find(&stripped)
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jira_issue_survives_pull_request_prefix() {
        assert_eq!(
            extract_jira_issue("Pull request #23: ISSUE-000: some text"),
            Some("ISSUE-000".to_string())
        );
    }

    #[test]
    fn jira_issue_from_plain_message() {
        assert_eq!(
            extract_jira_issue("META-17: update service payments"),
            Some("META-17".to_string())
        );
    }

    #[test]
    fn single_letter_tokens_are_not_issues() {
        assert_eq!(extract_jira_issue("a lowercase message"), None);
        assert_eq!(extract_jira_issue("A b"), None);
    }
}
