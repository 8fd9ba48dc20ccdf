// SPDX-License-Identifier: Apache-2.0

//! Path invariants of the metadata repository layout:
//!
//! ```text
//! owners/<alias>/owner.info.yaml
//! owners/<alias>/services/<serviceName>.yaml
//! owners/<alias>/repositories/<name>.<type>.yaml
//! ```

pub const OWNERS_DIR: &str = "owners";
pub const OWNER_INFO_FILE: &str = "owner.info.yaml";
pub const SERVICES_DIR: &str = "services";
pub const REPOSITORIES_DIR: &str = "repositories";
pub const YAML_SUFFIX: &str = ".yaml";

#[must_use]
pub fn owner_file_path(alias: &str) -> String {
    format!("{OWNERS_DIR}/{alias}/{OWNER_INFO_FILE}")
}

#[must_use]
pub fn owner_dir_path(alias: &str) -> String {
    format!("{OWNERS_DIR}/{alias}")
}

#[must_use]
pub fn service_file_path(alias: &str, name: &str) -> String {
    format!("{OWNERS_DIR}/{alias}/{SERVICES_DIR}/{name}{YAML_SUFFIX}")
}

#[must_use]
pub fn repository_file_path(alias: &str, key: &str) -> String {
    format!("{OWNERS_DIR}/{alias}/{REPOSITORIES_DIR}/{key}{YAML_SUFFIX}")
}

/// The entity a repository-relative path belongs to, when it matches one of
/// the three layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPath {
    Owner { alias: String },
    Service { alias: String, name: String },
    Repository { alias: String, key: String },
}

#[must_use]
pub fn classify_path(path: &str) -> Option<EntityPath> {
    let mut parts = path.split('/');
    if parts.next() != Some(OWNERS_DIR) {
        return None;
    }
    let alias = parts.next()?;
    if alias.is_empty() {
        return None;
    }
    match (parts.next(), parts.next(), parts.next()) {
        (Some(OWNER_INFO_FILE), None, _) => Some(EntityPath::Owner {
            alias: alias.to_string(),
        }),
        (Some(SERVICES_DIR), Some(file), None) => {
            let name = file.strip_suffix(YAML_SUFFIX)?;
            if name.is_empty() {
                return None;
            }
            Some(EntityPath::Service {
                alias: alias.to_string(),
                name: name.to_string(),
            })
        }
        (Some(REPOSITORIES_DIR), Some(file), None) => {
            let key = file.strip_suffix(YAML_SUFFIX)?;
            // A repository key always carries its type suffix.
            key.rsplit_once('.')?;
            Some(EntityPath::Repository {
                alias: alias.to_string(),
                key: key.to_string(),
            })
        }
        _ => None,
    }
}
