// SPDX-License-Identifier: Apache-2.0

use custodian_core::Error;
use regex::Regex;
use std::collections::BTreeSet;

pub const OWNER_ALIAS_MAX_LEN: usize = 28;
pub const SERVICE_NAME_MAX_LEN: usize = 28;
pub const REPOSITORY_NAME_MAX_LEN: usize = 64;

/// Configurable naming constraints applied to owner aliases, service names,
/// and repository keys.
#[derive(Debug, Clone)]
pub struct NameRules {
    pub owner_alias: Regex,
    pub owner_alias_max_len: usize,
    pub service_name: Regex,
    pub service_name_max_len: usize,
    pub repository_name: Regex,
    pub repository_name_max_len: usize,
    pub repository_types: BTreeSet<String>,
}

impl Default for NameRules {
    fn default() -> Self {
        let lower_kebab = r"^[a-z][a-z0-9-]*[a-z0-9]$";
        Self {
            owner_alias: Regex::new(lower_kebab).expect("owner alias regex"),
            owner_alias_max_len: OWNER_ALIAS_MAX_LEN,
            service_name: Regex::new(lower_kebab).expect("service name regex"),
            service_name_max_len: SERVICE_NAME_MAX_LEN,
            repository_name: Regex::new(lower_kebab).expect("repository name regex"),
            repository_name_max_len: REPOSITORY_NAME_MAX_LEN,
            repository_types: ["implementation", "helm-deployment", "api", "client", "test"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl NameRules {
    pub fn validate_owner_alias(&self, alias: &str) -> Result<(), Error> {
        if alias.is_empty() || alias.len() > self.owner_alias_max_len {
            return Err(Error::validation(format!(
                "owner alias must be 1..={} characters",
                self.owner_alias_max_len
            ))
            .with_detail("alias", alias));
        }
        if !self.owner_alias.is_match(alias) {
            return Err(Error::validation(format!(
                "owner alias must match {}",
                self.owner_alias.as_str()
            ))
            .with_detail("alias", alias));
        }
        Ok(())
    }

    pub fn validate_service_name(&self, name: &str) -> Result<(), Error> {
        if name.is_empty() || name.len() > self.service_name_max_len {
            return Err(Error::validation(format!(
                "service name must be 1..={} characters",
                self.service_name_max_len
            ))
            .with_detail("name", name));
        }
        if !self.service_name.is_match(name) {
            return Err(Error::validation(format!(
                "service name must match {}",
                self.service_name.as_str()
            ))
            .with_detail("name", name));
        }
        Ok(())
    }

    /// Validates a `<name>.<type>` repository key and returns its halves.
    pub fn validate_repository_key<'a>(&self, key: &'a str) -> Result<(&'a str, &'a str), Error> {
        let (name, repo_type) = key.rsplit_once('.').ok_or_else(|| {
            Error::validation("repository key must be <name>.<type>").with_detail("key", key)
        })?;
        if name.is_empty() || name.len() > self.repository_name_max_len {
            return Err(Error::validation(format!(
                "repository name must be 1..={} characters",
                self.repository_name_max_len
            ))
            .with_detail("key", key));
        }
        if !self.repository_name.is_match(name) {
            return Err(Error::validation(format!(
                "repository name must match {}",
                self.repository_name.as_str()
            ))
            .with_detail("key", key));
        }
        if !self.repository_types.contains(repo_type) {
            return Err(Error::validation(format!(
                "repository type must be one of {:?}",
                self.repository_types
            ))
            .with_detail("type", repo_type));
        }
        Ok((name, repo_type))
    }
}

/// Repository URLs must be ssh git URLs; http clones are not accepted.
pub fn validate_ssh_url(url: &str) -> Result<(), Error> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("repository url must not be empty"));
    }
    let ssh_scheme = trimmed.starts_with("ssh://");
    let scp_like = trimmed.starts_with("git@") && trimmed.contains(':');
    if !ssh_scheme && !scp_like {
        return Err(
            Error::validation("repository url must be an ssh git url").with_detail("url", trimmed)
        );
    }
    if !trimmed.ends_with(".git") {
        return Err(
            Error::validation("repository url must end with .git").with_detail("url", trimmed)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_accept_reasonable_names() {
        let rules = NameRules::default();
        assert!(rules.validate_owner_alias("platform-team").is_ok());
        assert!(rules.validate_service_name("payments").is_ok());
        assert!(rules
            .validate_repository_key("payments.helm-deployment")
            .is_ok());
    }

    #[test]
    fn unknown_repository_type_is_rejected() {
        let rules = NameRules::default();
        let err = rules
            .validate_repository_key("payments.container")
            .expect_err("unknown type");
        assert_eq!(err.kind(), custodian_core::ErrorKind::Validation);
    }

    #[test]
    fn uppercase_and_trailing_dash_are_rejected() {
        let rules = NameRules::default();
        assert!(rules.validate_owner_alias("Platform").is_err());
        assert!(rules.validate_owner_alias("platform-").is_err());
    }

    #[test]
    fn ssh_urls_only() {
        assert!(validate_ssh_url("ssh://git@host:7999/proj/repo.git").is_ok());
        assert!(validate_ssh_url("git@host:proj/repo.git").is_ok());
        assert!(validate_ssh_url("https://host/proj/repo.git").is_err());
        assert!(validate_ssh_url("ssh://git@host/proj/repo").is_err());
    }
}
