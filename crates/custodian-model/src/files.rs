// SPDX-License-Identifier: Apache-2.0

//! On-disk YAML shapes. Identity fields live in the file path and audit
//! fields live in git history, so neither appears inside the files; strict
//! parsing rejects them along with any other unknown key.

use crate::configuration::Configuration;
use crate::owner::Owner;
use crate::repository::{Mainline, Repository};
use crate::service::{OperationType, Quicklink, RequiredScan, Service};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OwnerFile {
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
}

impl OwnerFile {
    #[must_use]
    pub fn into_owner(self, alias: &str) -> Owner {
        Owner {
            alias: alias.to_string(),
            contact: self.contact,
            product_owner: self.product_owner,
            default_jira_project: self.default_jira_project,
            groups: self.groups,
            display_name: self.display_name,
            promoters: self.promoters,
            time_stamp: None,
            commit_hash: None,
            jira_issue: None,
        }
    }
}

impl From<&Owner> for OwnerFile {
    fn from(owner: &Owner) -> Self {
        Self {
            contact: owner.contact.clone(),
            product_owner: owner.product_owner.clone(),
            default_jira_project: owner.default_jira_project.clone(),
            groups: owner.groups.clone(),
            display_name: owner.display_name.clone(),
            promoters: owner.promoters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceFile {
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
}

impl ServiceFile {
    #[must_use]
    pub fn into_service(self, owner: &str, name: &str) -> Service {
        Service {
            name: name.to_string(),
            owner: owner.to_string(),
            description: self.description,
            alert_target: self.alert_target,
            quicklinks: self.quicklinks,
            repositories: self.repositories,
            development_only: self.development_only,
            operation_type: self.operation_type,
            required_scans: self.required_scans,
            time_stamp: None,
            commit_hash: None,
            jira_issue: None,
        }
    }
}

impl From<&Service> for ServiceFile {
    fn from(service: &Service) -> Self {
        Self {
            description: service.description.clone(),
            alert_target: service.alert_target.clone(),
            quicklinks: service.quicklinks.clone(),
            repositories: service.repositories.clone(),
            development_only: service.development_only,
            operation_type: service.operation_type,
            required_scans: service.required_scans.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryFile {
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
}

impl RepositoryFile {
    #[must_use]
    pub fn into_repository(self, owner: &str, key: &str) -> Repository {
        Repository {
            key: key.to_string(),
            owner: owner.to_string(),
            url: self.url,
            mainline: self.mainline,
            generator: self.generator,
            unittest: self.unittest,
            configuration: self.configuration,
            labels: self.labels,
            time_stamp: None,
            commit_hash: None,
            jira_issue: None,
        }
    }
}

impl From<&Repository> for RepositoryFile {
    fn from(repo: &Repository) -> Self {
        Self {
            url: repo.url.clone(),
            mainline: repo.mainline,
            generator: repo.generator.clone(),
            unittest: repo.unittest,
            configuration: repo.configuration.clone(),
            labels: repo.labels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_file_round_trips_through_record() {
        let yaml = "contact: team@example.com\ngroups:\n  admins:\n    - alice\n";
        let file: OwnerFile = serde_yaml::from_str(yaml).expect("parse owner file");
        let owner = file.into_owner("platform");
        assert_eq!(owner.alias, "platform");
        assert_eq!(owner.group_members("admins"), Some(&["alice".to_string()][..]));
        assert!(owner.commit_hash.is_none());
    }

    #[test]
    fn strict_parse_rejects_audit_fields_on_disk() {
        let yaml = "contact: team@example.com\ntimeStamp: 2026-01-01T00:00:00Z\n";
        assert!(serde_yaml::from_str::<OwnerFile>(yaml).is_err());
    }

    #[test]
    fn repository_file_rejects_unknown_fields() {
        let yaml = "url: ssh://git@host/p/r.git\nmainline: main\nnope: 1\n";
        assert!(serde_yaml::from_str::<RepositoryFile>(yaml).is_err());
    }
}
