// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccessKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Webhook {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
}

/// Users, groups, and unexpanded group references excused from a rule.
///
/// Group expansion moves `@owner.group` entries out of `users` into resolved
/// members while retaining the reference strings under `roles`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Exemptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProtectedRef {
    pub ref_matcher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_all_changes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_creation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_deletion: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_pushes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_force_pushes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemptions: Option<Exemptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefProtections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<ProtectedRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<ProtectedRef>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequireCondition {
    pub ref_matcher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemptions: Option<Exemptions>,
}

/// Repository configuration managed through the metadata files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_keys: Option<Vec<AccessKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_successful_builds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_issues: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_approvers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<Vec<Webhook>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approvers: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_protections: Option<RefProtections>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_conditions: Option<BTreeMap<String, RequireCondition>>,
}
