// SPDX-License-Identifier: Apache-2.0

//! Suggested-action rewrites. Both fixes operate on a working clone of the
//! pull-request head branch, commit as the requesting user with the service
//! account as committer, and push back to the same branch.

use crate::config::{CheckConfig, ExemptionTarget, ExpectedExemption};
use crate::format::canonicalize_yaml;
use custodian_core::Error;
use custodian_git::GitRepo;
use custodian_model::{CommitInfo, Exemptions, ProtectedRef, RepositoryFile, OWNERS_DIR};
use std::path::{Path, PathBuf};

/// The user on whose behalf a fix commit is authored.
#[derive(Debug, Clone)]
pub struct FixAuthor {
    pub name: String,
    pub email: String,
}

fn yaml_files_under(root: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        if !dir.exists() {
            continue;
        }
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::internal(format!("read dir {} failed: {e}", dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::internal(format!("read dir entry failed: {e}")))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Rewrites every metadata yaml file into canonical form, commits, pushes.
pub fn apply_formatting_fix(
    repo: &GitRepo,
    cfg: &CheckConfig,
    author: &FixAuthor,
) -> Result<CommitInfo, Error> {
    let owners_root = repo.workdir().join(OWNERS_DIR);
    for path in yaml_files_under(&owners_root)? {
        let source = std::fs::read_to_string(&path)
            .map_err(|e| Error::internal(format!("read {} failed: {e}", path.display())))?;
        // Unparsable files are left for the validator to report.
        let Ok(formatted) = canonicalize_yaml(&source) else {
            continue;
        };
        if formatted != source {
            std::fs::write(&path, formatted)
                .map_err(|e| Error::internal(format!("write {} failed: {e}", path.display())))?;
        }
    }
    let info = repo.commit_with_author(
        &format!("{} fix formatting", cfg.fix_message_prefix),
        &author.name,
        &author.email,
    )?;
    repo.push()?;
    Ok(info)
}

fn ensure_role(exemptions: &mut Option<Exemptions>, role: &str) -> bool {
    let slot = exemptions.get_or_insert_with(Exemptions::default);
    let contains = |list: &Option<Vec<String>>| {
        list.as_ref()
            .is_some_and(|entries| entries.iter().any(|e| e == role))
    };
    if contains(&slot.roles) || contains(&slot.groups) || contains(&slot.users) {
        return false;
    }
    let roles = slot.roles.get_or_insert_with(Vec::new);
    roles.push(role.to_string());
    roles.sort();
    true
}

fn protection_flag(rule: &ProtectedRef, target: &ExemptionTarget) -> bool {
    match target {
        ExemptionTarget::PreventAllChanges => rule.prevent_all_changes.unwrap_or(false),
        ExemptionTarget::PreventCreation => rule.prevent_creation.unwrap_or(false),
        ExemptionTarget::PreventDeletion => rule.prevent_deletion.unwrap_or(false),
        ExemptionTarget::PreventPushes => rule.prevent_pushes.unwrap_or(false),
        ExemptionTarget::PreventForcePushes => rule.prevent_force_pushes.unwrap_or(false),
        ExemptionTarget::RequireCondition { .. } => false,
    }
}

fn add_missing_exemptions(file: &mut RepositoryFile, expected: &[ExpectedExemption]) -> bool {
    let Some(configuration) = file.configuration.as_mut() else {
        return false;
    };
    let mut changed = false;
    for rule in expected {
        match &rule.target {
            ExemptionTarget::RequireCondition { key } => {
                if let Some(conditions) = configuration.require_conditions.as_mut() {
                    if let Some(condition) = conditions.get_mut(key) {
                        if condition.ref_matcher == rule.ref_matcher
                            && ensure_role(&mut condition.exemptions, &rule.exempted_role)
                        {
                            changed = true;
                        }
                    }
                }
            }
            target => {
                if let Some(protections) = configuration.ref_protections.as_mut() {
                    let lists = [protections.branches.as_mut(), protections.tags.as_mut()];
                    for list in lists.into_iter().flatten() {
                        for protection in list.iter_mut() {
                            if protection.ref_matcher == rule.ref_matcher
                                && protection_flag(protection, target)
                                && ensure_role(&mut protection.exemptions, &rule.exempted_role)
                            {
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
    }
    changed
}

/// Adds the configured missing exemptions to matching rules, commits,
/// pushes.
pub fn apply_exemption_fix(
    repo: &GitRepo,
    cfg: &CheckConfig,
    author: &FixAuthor,
) -> Result<CommitInfo, Error> {
    let owners_root = repo.workdir().join(OWNERS_DIR);
    for path in yaml_files_under(&owners_root)? {
        if path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str())
            != Some(custodian_model::REPOSITORIES_DIR)
        {
            continue;
        }
        let source = std::fs::read_to_string(&path)
            .map_err(|e| Error::internal(format!("read {} failed: {e}", path.display())))?;
        let Ok(mut file) = serde_yaml::from_str::<RepositoryFile>(&source) else {
            continue;
        };
        if add_missing_exemptions(&mut file, &cfg.expected_exemptions) {
            let rendered = serde_yaml::to_string(&file)
                .map_err(|e| Error::internal(format!("yaml render failed: {e}")))?;
            std::fs::write(&path, rendered)
                .map_err(|e| Error::internal(format!("write {} failed: {e}", path.display())))?;
        }
    }
    let info = repo.commit_with_author(
        &format!("{} fix exemptions", cfg.fix_message_prefix),
        &author.name,
        &author.email,
    )?;
    repo.push()?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_model::{Configuration, RefProtections, RequireCondition};
    use std::collections::BTreeMap;

    fn expected() -> Vec<ExpectedExemption> {
        vec![
            ExpectedExemption {
                target: ExemptionTarget::PreventPushes,
                ref_matcher: "release/*".to_string(),
                exempted_role: "@platform.releases".to_string(),
            },
            ExpectedExemption {
                target: ExemptionTarget::RequireCondition {
                    key: "signed-commits".to_string(),
                },
                ref_matcher: "main".to_string(),
                exempted_role: "@platform.bots".to_string(),
            },
        ]
    }

    #[test]
    fn adds_roles_to_matching_rules_once() {
        let mut file = RepositoryFile {
            url: "ssh://git@h/p/r.git".to_string(),
            mainline: custodian_model::Mainline::Main,
            generator: None,
            unittest: None,
            configuration: Some(Configuration {
                ref_protections: Some(RefProtections {
                    branches: Some(vec![ProtectedRef {
                        ref_matcher: "release/*".to_string(),
                        prevent_all_changes: None,
                        prevent_creation: None,
                        prevent_deletion: None,
                        prevent_pushes: Some(true),
                        prevent_force_pushes: None,
                        exemptions: None,
                    }]),
                    tags: None,
                }),
                require_conditions: Some(BTreeMap::from([(
                    "signed-commits".to_string(),
                    RequireCondition {
                        ref_matcher: "main".to_string(),
                        exemptions: None,
                    },
                )])),
                ..Configuration::default()
            }),
            labels: None,
        };

        assert!(add_missing_exemptions(&mut file, &expected()));
        // Second pass finds nothing left to add.
        assert!(!add_missing_exemptions(&mut file, &expected()));

        let configuration = file.configuration.expect("configuration");
        let branch = &configuration.ref_protections.expect("protections").branches.expect("branches")[0];
        assert_eq!(
            branch.exemptions.as_ref().and_then(|e| e.roles.clone()),
            Some(vec!["@platform.releases".to_string()])
        );
        let condition = &configuration.require_conditions.expect("conditions")["signed-commits"];
        assert_eq!(
            condition.exemptions.as_ref().and_then(|e| e.roles.clone()),
            Some(vec!["@platform.bots".to_string()])
        );
    }

    #[test]
    fn non_matching_ref_is_untouched() {
        let mut file = RepositoryFile {
            url: "ssh://git@h/p/r.git".to_string(),
            mainline: custodian_model::Mainline::Main,
            generator: None,
            unittest: None,
            configuration: Some(Configuration {
                ref_protections: Some(RefProtections {
                    branches: Some(vec![ProtectedRef {
                        ref_matcher: "hotfix/*".to_string(),
                        prevent_all_changes: None,
                        prevent_creation: None,
                        prevent_deletion: None,
                        prevent_pushes: Some(true),
                        prevent_force_pushes: None,
                        exemptions: None,
                    }]),
                    tags: None,
                }),
                ..Configuration::default()
            }),
            labels: None,
        };
        assert!(!add_missing_exemptions(&mut file, &expected()));
    }
}
