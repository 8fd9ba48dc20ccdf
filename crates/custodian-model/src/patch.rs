// SPDX-License-Identifier: Apache-2.0

//! Patch documents and their merge semantics.
//!
//! A field that is absent keeps the current value. A present empty string or
//! empty collection clears the target to null. A present non-empty value
//! replaces the target wholesale; nested configuration recurses. Audit
//! fields are taken verbatim from the patch since they carry the
//! optimistic-concurrency token.

use crate::configuration::{
    AccessKey, Configuration, ProtectedRef, RefProtections, RequireCondition, Webhook,
};
use crate::owner::Owner;
use crate::repository::{Mainline, Repository};
use crate::service::{OperationType, Quicklink, RequiredScan, Service};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn merge_required(patch: &Option<String>, current: &str) -> String {
    match patch {
        Some(value) => value.clone(),
        None => current.to_string(),
    }
}

fn merge_optional(patch: &Option<String>, current: &Option<String>) -> Option<String> {
    match patch {
        None => current.clone(),
        Some(value) if value.is_empty() => None,
        Some(value) => Some(value.clone()),
    }
}

fn merge_scalar<T: Copy>(patch: &Option<T>, current: &Option<T>) -> Option<T> {
    match patch {
        Some(value) => Some(*value),
        None => *current,
    }
}

fn merge_list<T: Clone>(patch: &Option<Vec<T>>, current: &Option<Vec<T>>) -> Option<Vec<T>> {
    match patch {
        None => current.clone(),
        Some(values) if values.is_empty() => None,
        Some(values) => Some(values.clone()),
    }
}

fn merge_map<K: Clone + Ord, V: Clone>(
    patch: &Option<BTreeMap<K, V>>,
    current: &Option<BTreeMap<K, V>>,
) -> Option<BTreeMap<K, V>> {
    match patch {
        None => current.clone(),
        Some(values) if values.is_empty() => None,
        Some(values) => Some(values.clone()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OwnerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
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

impl OwnerPatch {
    #[must_use]
    pub fn apply(&self, current: &Owner) -> Owner {
        Owner {
            alias: current.alias.clone(),
            contact: merge_required(&self.contact, &current.contact),
            product_owner: merge_optional(&self.product_owner, &current.product_owner),
            default_jira_project: merge_optional(
                &self.default_jira_project,
                &current.default_jira_project,
            ),
            groups: merge_map(&self.groups, &current.groups),
            display_name: merge_optional(&self.display_name, &current.display_name),
            promoters: merge_list(&self.promoters, &current.promoters),
            time_stamp: self.time_stamp,
            commit_hash: self.commit_hash.clone(),
            jira_issue: self.jira_issue.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
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

impl ServicePatch {
    #[must_use]
    pub fn apply(&self, current: &Service) -> Service {
        Service {
            name: current.name.clone(),
            owner: merge_required(&self.owner, &current.owner),
            description: merge_required(&self.description, &current.description),
            alert_target: merge_optional(&self.alert_target, &current.alert_target),
            quicklinks: merge_list(&self.quicklinks, &current.quicklinks),
            repositories: merge_list(&self.repositories, &current.repositories),
            development_only: merge_scalar(&self.development_only, &current.development_only),
            operation_type: merge_scalar(&self.operation_type, &current.operation_type),
            required_scans: merge_list(&self.required_scans, &current.required_scans),
            time_stamp: self.time_stamp,
            commit_hash: self.commit_hash.clone(),
            jira_issue: self.jira_issue.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefProtectionsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<ProtectedRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<ProtectedRef>>,
}

impl RefProtectionsPatch {
    #[must_use]
    pub fn apply(&self, current: Option<&RefProtections>) -> Option<RefProtections> {
        let empty = RefProtections::default();
        let base = current.unwrap_or(&empty);
        let merged = RefProtections {
            branches: merge_list(&self.branches, &base.branches),
            tags: merge_list(&self.tags, &base.tags),
        };
        if current.is_none() && merged == empty {
            return None;
        }
        Some(merged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigurationPatch {
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
    pub ref_protections: Option<RefProtectionsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_conditions: Option<BTreeMap<String, RequireCondition>>,
}

impl ConfigurationPatch {
    #[must_use]
    pub fn apply(&self, current: Option<&Configuration>) -> Option<Configuration> {
        let empty = Configuration::default();
        let base = current.unwrap_or(&empty);
        let merged = Configuration {
            access_keys: merge_list(&self.access_keys, &base.access_keys),
            commit_message_type: merge_optional(
                &self.commit_message_type,
                &base.commit_message_type,
            ),
            require_successful_builds: merge_scalar(
                &self.require_successful_builds,
                &base.require_successful_builds,
            ),
            require_issues: merge_scalar(&self.require_issues, &base.require_issues),
            require_approvers: merge_scalar(&self.require_approvers, &base.require_approvers),
            webhooks: merge_list(&self.webhooks, &base.webhooks),
            approvers: merge_map(&self.approvers, &base.approvers),
            watchers: merge_list(&self.watchers, &base.watchers),
            ref_protections: match &self.ref_protections {
                None => base.ref_protections.clone(),
                Some(patch) => patch.apply(base.ref_protections.as_ref()),
            },
            require_conditions: merge_map(&self.require_conditions, &base.require_conditions),
        };
        if current.is_none() && merged == empty {
            return None;
        }
        Some(merged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainline: Option<Mainline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unittest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_issue: Option<String>,
}

impl RepositoryPatch {
    #[must_use]
    pub fn apply(&self, current: &Repository) -> Repository {
        Repository {
            key: current.key.clone(),
            owner: merge_required(&self.owner, &current.owner),
            url: merge_required(&self.url, &current.url),
            mainline: self.mainline.unwrap_or(current.mainline),
            generator: merge_optional(&self.generator, &current.generator),
            unittest: merge_scalar(&self.unittest, &current.unittest),
            configuration: match &self.configuration {
                None => current.configuration.clone(),
                Some(patch) => patch.apply(current.configuration.as_ref()),
            },
            labels: merge_list(&self.labels, &current.labels),
            time_stamp: self.time_stamp,
            commit_hash: self.commit_hash.clone(),
            jira_issue: self.jira_issue.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_repository() -> Repository {
        Repository {
            key: "svc.implementation".to_string(),
            owner: "platform".to_string(),
            url: "ssh://git@host/p/svc.git".to_string(),
            mainline: Mainline::Main,
            generator: Some("foo".to_string()),
            unittest: None,
            configuration: Some(Configuration {
                approvers: Some(BTreeMap::from([(
                    "a".to_string(),
                    vec!["x".to_string()],
                )])),
                watchers: Some(vec!["w".to_string()]),
                ..Configuration::default()
            }),
            labels: Some(vec!["tier-1".to_string()]),
            time_stamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single(),
            commit_hash: Some("h1".to_string()),
            jira_issue: Some("META-1".to_string()),
        }
    }

    #[test]
    fn empty_string_and_empty_map_clear_fields() {
        let current = sample_repository();
        let patch = RepositoryPatch {
            generator: Some(String::new()),
            configuration: Some(ConfigurationPatch {
                approvers: Some(BTreeMap::new()),
                ..ConfigurationPatch::default()
            }),
            time_stamp: current.time_stamp,
            commit_hash: current.commit_hash.clone(),
            jira_issue: Some("META-2".to_string()),
            ..RepositoryPatch::default()
        };
        let merged = patch.apply(&current);
        assert_eq!(merged.generator, None);
        let cfg = merged.configuration.expect("configuration kept");
        assert_eq!(cfg.approvers, None);
        assert_eq!(cfg.watchers, Some(vec!["w".to_string()]));
        assert_eq!(merged.url, current.url);
        assert_eq!(merged.labels, current.labels);
    }

    #[test]
    fn all_absent_patch_only_touches_audit_fields() {
        let current = sample_repository();
        let patch = RepositoryPatch {
            time_stamp: current.time_stamp,
            commit_hash: current.commit_hash.clone(),
            jira_issue: Some("META-9".to_string()),
            ..RepositoryPatch::default()
        };
        let merged = patch.apply(&current);
        assert_eq!(merged.generator, current.generator);
        assert_eq!(merged.configuration, current.configuration);
        assert_eq!(merged.jira_issue, Some("META-9".to_string()));
    }

    #[test]
    fn required_string_is_authoritative() {
        let current = sample_repository();
        let patch = RepositoryPatch {
            owner: Some("search".to_string()),
            ..RepositoryPatch::default()
        };
        assert_eq!(patch.apply(&current).owner, "search");
    }

    #[test]
    fn list_replacement_is_wholesale() {
        let current = Service {
            name: "svc".to_string(),
            owner: "platform".to_string(),
            description: "payments".to_string(),
            alert_target: None,
            quicklinks: None,
            repositories: Some(vec!["svc.implementation".to_string()]),
            development_only: None,
            operation_type: None,
            required_scans: None,
            time_stamp: None,
            commit_hash: None,
            jira_issue: None,
        };
        let patch = ServicePatch {
            repositories: Some(vec![
                "svc.implementation".to_string(),
                "svc.api".to_string(),
            ]),
            ..ServicePatch::default()
        };
        assert_eq!(
            patch.apply(&current).repositories,
            Some(vec![
                "svc.implementation".to_string(),
                "svc.api".to_string()
            ])
        );
        let clearing = ServicePatch {
            repositories: Some(Vec::new()),
            ..ServicePatch::default()
        };
        assert_eq!(clearing.apply(&current).repositories, None);
    }
}
