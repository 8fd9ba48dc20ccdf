// SPDX-License-Identifier: Apache-2.0

//! Translation between YAML files in the working copy and typed entity
//! records. Every mutating method assumes the caller holds the Updater's
//! metadata lock; the working copy is never touched outside it.

use crate::config::RuntimeConfig;
use custodian_core::Error;
use custodian_model::{
    classify_path, dedup_sorted, extract_jira_issue, owner_file_path, parse_group_ref,
    repository_file_path, service_file_path, CommitInfo, EntityPath, Exemptions, Owner, OwnerFile,
    Repository, RepositoryFile, Service, ServiceFile, UpdateEvent, OWNERS_DIR, REPOSITORIES_DIR,
    SERVICES_DIR, YAML_SUFFIX,
};
use custodian_git::GitRepo;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

pub struct Mapper {
    git: GitRepo,
    cfg: Arc<RuntimeConfig>,
}

fn derive_event(commit: &CommitInfo) -> UpdateEvent {
    let mut event = UpdateEvent {
        commit_hash: commit.commit_hash.clone(),
        time_stamp: commit.time_stamp,
        owner_aliases: Default::default(),
        service_names: Default::default(),
        repository_keys: Default::default(),
    };
    for path in &commit.files_changed {
        match classify_path(path) {
            Some(EntityPath::Owner { alias }) => {
                event.owner_aliases.insert(alias);
            }
            Some(EntityPath::Service { name, .. }) => {
                event.service_names.insert(name);
            }
            Some(EntityPath::Repository { key, .. }) => {
                event.repository_keys.insert(key);
            }
            None => {}
        }
    }
    event
}

impl Mapper {
    #[must_use]
    pub fn new(git: GitRepo, cfg: Arc<RuntimeConfig>) -> Self {
        Self { git, cfg }
    }

    #[must_use]
    pub fn git(&self) -> &GitRepo {
        &self.git
    }

    /// Pulls the remote and derives one update event per new commit from
    /// the filenames it touched. Commits outside the metadata layout yield
    /// no event.
    pub fn refresh_metadata(&mut self) -> Result<Vec<UpdateEvent>, Error> {
        let commits = self.git.pull()?;
        Ok(commits
            .iter()
            .map(derive_event)
            .filter(|event| !event.is_empty())
            .collect())
    }

    /// True iff the event's commit has not been pulled yet.
    #[must_use]
    pub fn contains_new_information(&self, event: &UpdateEvent) -> bool {
        !self.git.is_commit_known(&event.commit_hash)
    }

    /// Owner directories that contain an `owner.info.yaml` and match the
    /// configured alias filter, lexicographically sorted.
    pub fn sorted_owner_aliases(&self) -> Result<Vec<String>, Error> {
        let mut aliases = Vec::new();
        for name in self.git.read_dir(OWNERS_DIR)? {
            if !self.cfg.owner_alias_filter.is_match(&name) {
                continue;
            }
            if self.git.stat(&owner_file_path(&name)) {
                aliases.push(name);
            }
        }
        Ok(aliases)
    }

    /// Service name to owner alias, across every owner.
    pub fn service_owner_index(&self) -> Result<BTreeMap<String, String>, Error> {
        let mut index = BTreeMap::new();
        for alias in self.sorted_owner_aliases()? {
            let dir = format!("{OWNERS_DIR}/{alias}/{SERVICES_DIR}");
            for file in self.git.read_dir(&dir)? {
                if let Some(name) = file.strip_suffix(YAML_SUFFIX) {
                    index.insert(name.to_string(), alias.clone());
                }
            }
        }
        Ok(index)
    }

    /// Repository key to owner alias, across every owner.
    pub fn repository_owner_index(&self) -> Result<BTreeMap<String, String>, Error> {
        let mut index = BTreeMap::new();
        for alias in self.sorted_owner_aliases()? {
            let dir = format!("{OWNERS_DIR}/{alias}/{REPOSITORIES_DIR}");
            for file in self.git.read_dir(&dir)? {
                if let Some(key) = file.strip_suffix(YAML_SUFFIX) {
                    if key.contains('.') {
                        index.insert(key.to_string(), alias.clone());
                    }
                }
            }
        }
        Ok(index)
    }

    pub fn owner_of_service(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.service_owner_index()?.get(name).cloned())
    }

    pub fn owner_of_repository(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.repository_owner_index()?.get(key).cloned())
    }

    fn raw_owner_file(&self, alias: &str) -> Result<OwnerFile, Error> {
        let (bytes, _) = self.git.read_file(&owner_file_path(alias))?;
        serde_yaml::from_slice(&bytes)
            .map_err(|e| Error::internal(format!("owner file for {alias} unparsable: {e}")))
    }

    /// Resolves `@owner.group` references to that group's members; plain
    /// entries pass through. Unresolvable references are dropped with a
    /// warning. The result is sorted and deduplicated.
    fn expand_members(&self, entries: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for entry in entries {
            match parse_group_ref(entry) {
                Some((alias, group)) => match self.raw_owner_file(alias) {
                    Ok(file) => {
                        let members = file
                            .groups
                            .as_ref()
                            .and_then(|g| g.get(group))
                            .cloned()
                            .unwrap_or_default();
                        if members.is_empty() {
                            warn!(entry, "group reference resolves to nothing");
                        }
                        out.extend(members);
                    }
                    Err(_) => warn!(entry, "group reference to unknown owner"),
                },
                None => out.push(entry.clone()),
            }
        }
        dedup_sorted(out)
    }

    /// Exemption lists expand like any member list, but the group-reference
    /// strings are retained as a separate roles projection.
    fn expand_exemptions(&self, exemptions: &mut Exemptions) {
        let originals = exemptions.users.take().unwrap_or_default();
        let mut roles = exemptions.roles.take().unwrap_or_default();
        let mut users = Vec::new();
        for entry in &originals {
            if parse_group_ref(entry).is_some() {
                roles.push(entry.clone());
            }
        }
        users.extend(self.expand_members(&originals));
        exemptions.users = if users.is_empty() { None } else { Some(users) };
        let roles = dedup_sorted(roles);
        exemptions.roles = if roles.is_empty() { None } else { Some(roles) };
    }

    pub fn get_owner(&self, alias: &str) -> Result<Owner, Error> {
        let path = owner_file_path(alias);
        let (bytes, info) = self.git.read_file(&path)?;
        let file: OwnerFile = serde_yaml::from_slice(&bytes)
            .map_err(|e| Error::internal(format!("owner file for {alias} unparsable: {e}")))?;
        let mut owner = file.into_owner(alias);
        if let Some(groups) = &mut owner.groups {
            let expanded: BTreeMap<String, Vec<String>> = groups
                .iter()
                .map(|(name, members)| (name.clone(), self.expand_members(members)))
                .collect();
            *groups = expanded;
        }
        owner.time_stamp = Some(info.time_stamp);
        owner.commit_hash = Some(info.commit_hash.clone());
        owner.jira_issue = extract_jira_issue(&info.message);
        Ok(owner)
    }

    pub fn get_service(&self, alias: &str, name: &str) -> Result<Service, Error> {
        let path = service_file_path(alias, name);
        let (bytes, info) = self.git.read_file(&path)?;
        let file: ServiceFile = serde_yaml::from_slice(&bytes)
            .map_err(|e| Error::internal(format!("service file for {name} unparsable: {e}")))?;
        let mut service = file.into_service(alias, name);
        service.time_stamp = Some(info.time_stamp);
        service.commit_hash = Some(info.commit_hash.clone());
        service.jira_issue = extract_jira_issue(&info.message);
        Ok(service)
    }

    pub fn get_repository(&self, alias: &str, key: &str) -> Result<Repository, Error> {
        let path = repository_file_path(alias, key);
        let (bytes, info) = self.git.read_file(&path)?;
        let file: RepositoryFile = serde_yaml::from_slice(&bytes)
            .map_err(|e| Error::internal(format!("repository file for {key} unparsable: {e}")))?;
        let mut repository = file.into_repository(alias, key);
        if let Some(configuration) = &mut repository.configuration {
            if let Some(approvers) = &mut configuration.approvers {
                let expanded: BTreeMap<String, Vec<String>> = approvers
                    .iter()
                    .map(|(name, members)| (name.clone(), self.expand_members(members)))
                    .collect();
                *approvers = expanded;
            }
            if let Some(watchers) = &mut configuration.watchers {
                *watchers = self.expand_members(watchers);
            }
            if let Some(protections) = &mut configuration.ref_protections {
                for rule in protections
                    .branches
                    .iter_mut()
                    .flatten()
                    .chain(protections.tags.iter_mut().flatten())
                {
                    if let Some(exemptions) = &mut rule.exemptions {
                        self.expand_exemptions(exemptions);
                    }
                }
            }
            if let Some(conditions) = &mut configuration.require_conditions {
                for condition in conditions.values_mut() {
                    if let Some(exemptions) = &mut condition.exemptions {
                        self.expand_exemptions(exemptions);
                    }
                }
            }
        }
        repository.time_stamp = Some(info.time_stamp);
        repository.commit_hash = Some(info.commit_hash.clone());
        repository.jira_issue = extract_jira_issue(&info.message);
        Ok(repository)
    }

    /// Restores a clean working copy after a failed mutation. The original
    /// error always wins; a failing re-clone is only logged.
    fn recover(&mut self) {
        if let Err(e) = self.git.clone_fresh() {
            error!(error = %e, "re-clone after failed mutation failed");
        }
    }

    /// Commit and push, treating an empty diff as success. Returns the
    /// commit that now covers the given path.
    fn commit_and_push(&mut self, message: &str, path: &str) -> Result<CommitInfo, Error> {
        match self.git.commit(message) {
            Ok(_info) => {
                self.git.push()?;
                let (_, info) = self.git.read_file(path)?;
                Ok(info)
            }
            Err(e) if e.is_no_changes() => {
                let (_, info) = self.git.read_file(path)?;
                Ok(info)
            }
            Err(e) => Err(e),
        }
    }

    pub fn write_owner(&mut self, owner: &Owner) -> Result<Owner, Error> {
        self.git.pull()?;
        let jira = owner.jira_issue.clone().unwrap_or_default();
        let path = owner_file_path(&owner.alias);
        let result = (|| {
            let yaml = serde_yaml::to_string(&OwnerFile::from(owner))
                .map_err(|e| Error::internal(format!("owner marshal failed: {e}")))?;
            self.git.write_file(&path, yaml.as_bytes())?;
            self.commit_and_push(&format!("{jira}: update owner {}", owner.alias), &path)
        })();
        match result {
            Ok(_) => self.get_owner(&owner.alias),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    pub fn delete_owner(&mut self, alias: &str, jira: &str) -> Result<CommitInfo, Error> {
        self.git.pull()?;
        let path = owner_file_path(alias);
        let result: Result<CommitInfo, Error> = (|| {
            self.git.delete_file(&path)?;
            let info = self.git.commit(&format!("{jira}: delete owner {alias}"))?;
            self.git.push()?;
            Ok(info)
        })();
        match result {
            Ok(info) => Ok(info),
            Err(e) if e.is_no_changes() => self.git.head_commit(),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    pub fn write_service(&mut self, service: &Service) -> Result<Service, Error> {
        self.git.pull()?;
        let jira = service.jira_issue.clone().unwrap_or_default();
        let path = service_file_path(&service.owner, &service.name);
        let result = (|| {
            let yaml = serde_yaml::to_string(&ServiceFile::from(service))
                .map_err(|e| Error::internal(format!("service marshal failed: {e}")))?;
            self.git.write_file(&path, yaml.as_bytes())?;
            self.commit_and_push(&format!("{jira}: update service {}", service.name), &path)
        })();
        match result {
            Ok(_) => self.get_service(&service.owner, &service.name),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    pub fn delete_service(&mut self, alias: &str, name: &str, jira: &str) -> Result<CommitInfo, Error> {
        self.git.pull()?;
        let path = service_file_path(alias, name);
        let result: Result<CommitInfo, Error> = (|| {
            self.git.delete_file(&path)?;
            let info = self.git.commit(&format!("{jira}: delete service {name}"))?;
            self.git.push()?;
            Ok(info)
        })();
        match result {
            Ok(info) => Ok(info),
            Err(e) if e.is_no_changes() => self.git.head_commit(),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    pub fn write_repository(&mut self, repository: &Repository) -> Result<Repository, Error> {
        self.git.pull()?;
        let jira = repository.jira_issue.clone().unwrap_or_default();
        let path = repository_file_path(&repository.owner, &repository.key);
        let result = (|| {
            let yaml = serde_yaml::to_string(&RepositoryFile::from(repository))
                .map_err(|e| Error::internal(format!("repository marshal failed: {e}")))?;
            self.git.write_file(&path, yaml.as_bytes())?;
            self.commit_and_push(
                &format!("{jira}: update repository {}", repository.key),
                &path,
            )
        })();
        match result {
            Ok(_) => self.get_repository(&repository.owner, &repository.key),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    pub fn delete_repository(&mut self, alias: &str, key: &str, jira: &str) -> Result<CommitInfo, Error> {
        self.git.pull()?;
        let path = repository_file_path(alias, key);
        let result: Result<CommitInfo, Error> = (|| {
            self.git.delete_file(&path)?;
            let info = self.git.commit(&format!("{jira}: delete repository {key}"))?;
            self.git.push()?;
            Ok(info)
        })();
        match result {
            Ok(info) => Ok(info),
            Err(e) if e.is_no_changes() => self.git.head_commit(),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    /// Moves a service to another owner, dragging every referenced
    /// repository along, in one commit. Unreferenced repositories of the
    /// old owner stay where they are.
    pub fn write_service_with_changed_owner(
        &mut self,
        name: &str,
        service: &Service,
    ) -> Result<Service, Error> {
        let new_owner = service.owner.clone();
        if new_owner.is_empty() {
            return Err(Error::validation("target owner must not be empty"));
        }
        self.git.pull()?;
        let old_owner = self
            .owner_of_service(name)?
            .ok_or_else(|| Error::not_found(format!("service {name} not found")))?;
        if old_owner == new_owner {
            return Err(Error::validation(format!(
                "service {name} already belongs to {new_owner}"
            )));
        }
        let jira = service.jira_issue.clone().unwrap_or_default();
        let result = (|| {
            let yaml = serde_yaml::to_string(&ServiceFile::from(service))
                .map_err(|e| Error::internal(format!("service marshal failed: {e}")))?;
            self.git
                .write_file(&service_file_path(&new_owner, name), yaml.as_bytes())?;
            self.git.delete_file(&service_file_path(&old_owner, name))?;
            for key in service.repository_keys() {
                let old_path = repository_file_path(&old_owner, key);
                let (bytes, _) = self.git.read_file(&old_path)?;
                // Owner is derived from the path; the contents move as-is.
                serde_yaml::from_slice::<RepositoryFile>(&bytes).map_err(|e| {
                    Error::internal(format!("repository file for {key} unparsable: {e}"))
                })?;
                self.git
                    .write_file(&repository_file_path(&new_owner, key), &bytes)?;
                self.git.delete_file(&old_path)?;
            }
            let info = self.git.commit(&format!(
                "{jira}: move service {name} from {old_owner} to {new_owner}"
            ))?;
            self.git.push()?;
            Ok(info)
        })();
        match result {
            Ok(_) => self.get_service(&new_owner, name),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    /// Moves a single repository to another owner. The caller must have
    /// verified that no service still references the key.
    pub fn write_repository_with_changed_owner(
        &mut self,
        key: &str,
        repository: &Repository,
    ) -> Result<Repository, Error> {
        let new_owner = repository.owner.clone();
        if new_owner.is_empty() {
            return Err(Error::validation("target owner must not be empty"));
        }
        self.git.pull()?;
        let old_owner = self
            .owner_of_repository(key)?
            .ok_or_else(|| Error::not_found(format!("repository {key} not found")))?;
        if old_owner == new_owner {
            return Err(Error::validation(format!(
                "repository {key} already belongs to {new_owner}"
            )));
        }
        let jira = repository.jira_issue.clone().unwrap_or_default();
        let result = (|| {
            let yaml = serde_yaml::to_string(&RepositoryFile::from(repository))
                .map_err(|e| Error::internal(format!("repository marshal failed: {e}")))?;
            self.git
                .write_file(&repository_file_path(&new_owner, key), yaml.as_bytes())?;
            self.git.delete_file(&repository_file_path(&old_owner, key))?;
            let info = self.git.commit(&format!(
                "{jira}: move repository {key} from {old_owner} to {new_owner}"
            ))?;
            self.git.push()?;
            Ok(info)
        })();
        match result {
            Ok(_) => self.get_repository(&new_owner, key),
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }
}
