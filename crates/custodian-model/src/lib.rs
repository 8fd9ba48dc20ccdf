// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub const CRATE_NAME: &str = "custodian-model";

mod commit;
mod configuration;
mod files;
mod groups;
mod names;
mod owner;
mod paths;
mod patch;
mod repository;
mod service;

pub use commit::{extract_jira_issue, ChangeEvent, CommitInfo, EntityKind, UpdateEvent};
pub use configuration::{
    AccessKey, Configuration, Exemptions, ProtectedRef, RefProtections, RequireCondition, Webhook,
};
pub use files::{OwnerFile, RepositoryFile, ServiceFile};
pub use groups::{dedup_sorted, parse_group_ref};
pub use names::{validate_ssh_url, NameRules};
pub use owner::Owner;
pub use paths::{
    classify_path, owner_dir_path, owner_file_path, repository_file_path, service_file_path,
    EntityPath, OWNERS_DIR, OWNER_INFO_FILE, REPOSITORIES_DIR, SERVICES_DIR, YAML_SUFFIX,
};
pub use patch::{
    ConfigurationPatch, OwnerPatch, RefProtectionsPatch, RepositoryPatch, ServicePatch,
};
pub use repository::{Mainline, Repository};
pub use service::{OperationType, Quicklink, RequiredScan, Service};
