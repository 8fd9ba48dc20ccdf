// SPDX-License-Identifier: Apache-2.0

use crate::annotations::{annotation_from_parse_error, Annotation, AnnotationLevel};
use crate::config::{CheckConfig, ExemptionTarget, ExpectedExemption};
use crate::format::{canonicalize_yaml, formatting_diff};
use custodian_core::Error;
use custodian_model::{
    classify_path, EntityPath, Exemptions, OwnerFile, ProtectedRef, RepositoryFile, ServiceFile,
    OWNERS_DIR, YAML_SUFFIX,
};
use std::collections::BTreeMap;

/// File listing of one candidate revision. Production hands in a fetched
/// [`custodian_git::RevisionTree`]; tests use an in-memory map.
pub trait RevisionFiles {
    fn paths(&self) -> Result<Vec<String>, Error>;
    fn read(&self, path: &str) -> Result<Vec<u8>, Error>;
}

impl RevisionFiles for BTreeMap<String, Vec<u8>> {
    fn paths(&self) -> Result<Vec<String>, Error> {
        Ok(self.keys().cloned().collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, Error> {
        self.get(path)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no blob at {path}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub annotations: Vec<Annotation>,
    pub file_errors: Vec<String>,
    pub ignored: Vec<IgnoredFile>,
    pub needs_format_fix: bool,
    pub needs_exemption_fix: bool,
}

impl ValidationReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.file_errors.is_empty()
            && !self
                .annotations
                .iter()
                .any(|a| a.level == AnnotationLevel::Failure)
    }

    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_success() {
            "all metadata files are valid".to_string()
        } else {
            format!(
                "{} finding(s) across {} file error(s)",
                self.annotations.len(),
                self.file_errors.len()
            )
        }
    }

    /// Markdown bullet list of file errors for the check-run body.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        if self.file_errors.is_empty() {
            return None;
        }
        let mut text = String::new();
        for error in &self.file_errors {
            text.push_str("* ");
            text.push_str(error);
            text.push('\n');
        }
        Some(text)
    }
}

fn missing_role(exemptions: Option<&Exemptions>, role: &str) -> bool {
    let Some(exemptions) = exemptions else {
        return true;
    };
    let listed = |list: &Option<Vec<String>>| {
        list.as_ref()
            .is_some_and(|entries| entries.iter().any(|e| e == role))
    };
    !(listed(&exemptions.roles) || listed(&exemptions.groups) || listed(&exemptions.users))
}

fn protection_applies(rule: &ProtectedRef, target: &ExemptionTarget) -> bool {
    let flag = match target {
        ExemptionTarget::PreventAllChanges => rule.prevent_all_changes,
        ExemptionTarget::PreventCreation => rule.prevent_creation,
        ExemptionTarget::PreventDeletion => rule.prevent_deletion,
        ExemptionTarget::PreventPushes => rule.prevent_pushes,
        ExemptionTarget::PreventForcePushes => rule.prevent_force_pushes,
        ExemptionTarget::RequireCondition { .. } => return false,
    };
    flag.unwrap_or(false)
}

fn check_expected_exemptions(
    path: &str,
    file: &RepositoryFile,
    expected: &[ExpectedExemption],
    annotations: &mut Vec<Annotation>,
) -> bool {
    let Some(configuration) = &file.configuration else {
        return false;
    };
    let mut missing = false;
    for rule in expected {
        match &rule.target {
            ExemptionTarget::RequireCondition { key } => {
                let Some(conditions) = &configuration.require_conditions else {
                    continue;
                };
                let Some(condition) = conditions.get(key) else {
                    continue;
                };
                if condition.ref_matcher == rule.ref_matcher
                    && missing_role(condition.exemptions.as_ref(), &rule.exempted_role)
                {
                    missing = true;
                    annotations.push(Annotation::failure(
                        path,
                        1,
                        format!(
                            "require condition {key} on {} must exempt {}",
                            rule.ref_matcher, rule.exempted_role
                        ),
                    ));
                }
            }
            target => {
                let Some(protections) = &configuration.ref_protections else {
                    continue;
                };
                let rules = protections
                    .branches
                    .iter()
                    .flatten()
                    .chain(protections.tags.iter().flatten());
                for protection in rules {
                    if protection.ref_matcher == rule.ref_matcher
                        && protection_applies(protection, target)
                        && missing_role(protection.exemptions.as_ref(), &rule.exempted_role)
                    {
                        missing = true;
                        annotations.push(Annotation::failure(
                            path,
                            1,
                            format!(
                                "ref protection on {} must exempt {}",
                                rule.ref_matcher, rule.exempted_role
                            ),
                        ));
                    }
                }
            }
        }
    }
    missing
}

/// Walks every file of a candidate revision, strict-parses the metadata
/// files, and collects annotations, duplicate findings, formatting
/// differences, and missing exemptions into one report.
pub fn validate_revision_files(
    files: &dyn RevisionFiles,
    cfg: &CheckConfig,
) -> Result<ValidationReport, Error> {
    let mut report = ValidationReport::default();
    let mut key_to_path: BTreeMap<String, String> = BTreeMap::new();
    let mut url_to_path: BTreeMap<String, String> = BTreeMap::new();

    for path in files.paths()? {
        if !path.starts_with(&format!("{OWNERS_DIR}/")) {
            report.ignored.push(IgnoredFile {
                path,
                reason: "outside owners/".to_string(),
            });
            continue;
        }
        if !path.ends_with(YAML_SUFFIX) {
            report.ignored.push(IgnoredFile {
                path,
                reason: "not a yaml file".to_string(),
            });
            continue;
        }
        let Some(entity) = classify_path(&path) else {
            report.ignored.push(IgnoredFile {
                path,
                reason: "not a recognised metadata file".to_string(),
            });
            continue;
        };
        let bytes = files.read(&path)?;
        let Ok(source) = std::str::from_utf8(&bytes) else {
            report
                .file_errors
                .push(format!("`{path}`: not valid utf-8"));
            report
                .annotations
                .push(Annotation::failure(&path, 1, "file is not valid utf-8"));
            continue;
        };

        let parsed_ok = match &entity {
            EntityPath::Owner { .. } => match serde_yaml::from_str::<OwnerFile>(source) {
                Ok(_) => true,
                Err(err) => {
                    report
                        .file_errors
                        .push(format!("`{path}`: {err}"));
                    report
                        .annotations
                        .push(annotation_from_parse_error(&path, &err));
                    false
                }
            },
            EntityPath::Service { .. } => match serde_yaml::from_str::<ServiceFile>(source) {
                Ok(_) => true,
                Err(err) => {
                    report
                        .file_errors
                        .push(format!("`{path}`: {err}"));
                    report
                        .annotations
                        .push(annotation_from_parse_error(&path, &err));
                    false
                }
            },
            EntityPath::Repository { key, .. } => match serde_yaml::from_str::<RepositoryFile>(
                source,
            ) {
                Ok(file) => {
                    if let Err(err) = cfg.name_rules.validate_repository_key(key) {
                        report
                            .file_errors
                            .push(format!("`{path}`: {err}"));
                        report
                            .annotations
                            .push(Annotation::failure(&path, 1, err.message.clone()));
                    }
                    if let Some(previous) = key_to_path.get(key.as_str()) {
                        report.annotations.push(Annotation::failure(
                            &path,
                            1,
                            format!("repository key {key} already defined in {previous}"),
                        ));
                    } else {
                        key_to_path.insert(key.clone(), path.clone());
                    }
                    if let Some(previous) = url_to_path.get(&file.url) {
                        report.annotations.push(Annotation::failure(
                            &path,
                            1,
                            format!("repository url {} already used by {previous}", file.url),
                        ));
                    } else {
                        url_to_path.insert(file.url.clone(), path.clone());
                    }
                    if check_expected_exemptions(
                        &path,
                        &file,
                        &cfg.expected_exemptions,
                        &mut report.annotations,
                    ) {
                        report.needs_exemption_fix = true;
                    }
                    true
                }
                Err(err) => {
                    report
                        .file_errors
                        .push(format!("`{path}`: {err}"));
                    report
                        .annotations
                        .push(annotation_from_parse_error(&path, &err));
                    false
                }
            },
        };

        if parsed_ok {
            let formatted = canonicalize_yaml(source)?;
            if let Some(diff) = formatting_diff(&path, source, &formatted) {
                report.needs_format_fix = true;
                report.annotations.push(
                    Annotation::failure(&path, 1, diff).with_title("formatting"),
                );
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckConfig, ExemptionTarget, ExpectedExemption};

    fn canonical(source: &str) -> Vec<u8> {
        canonicalize_yaml(source)
            .expect("canonical yaml")
            .into_bytes()
    }

    fn fixture() -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        files.insert(
            "owners/a/owner.info.yaml".to_string(),
            canonical("contact: a@example.com\n"),
        );
        files.insert(
            "owners/a/services/svc.yaml".to_string(),
            canonical("description: payments\nrepositories:\n  - svc.implementation\n"),
        );
        files.insert(
            "owners/a/repositories/svc.implementation.yaml".to_string(),
            canonical("url: ssh://git@h/p/r1.git\nmainline: main\n"),
        );
        files
    }

    #[test]
    fn clean_revision_is_success() {
        let report =
            validate_revision_files(&fixture(), &CheckConfig::default()).expect("validate");
        assert!(report.is_success(), "unexpected: {:?}", report.annotations);
        assert!(!report.needs_format_fix);
    }

    #[test]
    fn files_outside_owners_are_ignored_with_reason() {
        let mut files = fixture();
        files.insert("README.md".to_string(), b"hi".to_vec());
        files.insert("owners/a/notes.txt".to_string(), b"hi".to_vec());
        let report = validate_revision_files(&files, &CheckConfig::default()).expect("validate");
        assert!(report
            .ignored
            .iter()
            .any(|i| i.path == "README.md" && i.reason == "outside owners/"));
        assert!(report
            .ignored
            .iter()
            .any(|i| i.path == "owners/a/notes.txt" && i.reason == "not a yaml file"));
    }

    #[test]
    fn duplicate_url_cites_the_first_file() {
        let mut files = fixture();
        files.insert(
            "owners/b/owner.info.yaml".to_string(),
            canonical("contact: b@example.com\n"),
        );
        files.insert(
            "owners/b/repositories/r2.implementation.yaml".to_string(),
            canonical("url: ssh://git@h/p/r1.git\nmainline: main\n"),
        );
        let report = validate_revision_files(&files, &CheckConfig::default()).expect("validate");
        let duplicate = report
            .annotations
            .iter()
            .find(|a| a.path == "owners/b/repositories/r2.implementation.yaml")
            .expect("duplicate annotation");
        assert!(duplicate
            .message
            .contains("owners/a/repositories/svc.implementation.yaml"));
        assert!(!report.is_success());
    }

    #[test]
    fn unknown_field_fails_strict_parse() {
        let mut files = fixture();
        files.insert(
            "owners/a/services/bad.yaml".to_string(),
            b"description: x\nsurprise: 1\n".to_vec(),
        );
        let report = validate_revision_files(&files, &CheckConfig::default()).expect("validate");
        assert!(!report.is_success());
        assert!(report.file_errors.iter().any(|e| e.contains("bad.yaml")));
        assert!(report.body_text().expect("body").starts_with("* "));
    }

    #[test]
    fn formatting_difference_enables_fix_action() {
        let mut files = fixture();
        files.insert(
            "owners/a/services/messy.yaml".to_string(),
            b"description:     'messy'\n".to_vec(),
        );
        let report = validate_revision_files(&files, &CheckConfig::default()).expect("validate");
        assert!(report.needs_format_fix);
        assert!(report
            .annotations
            .iter()
            .any(|a| a.title.as_deref() == Some("formatting")));
    }

    #[test]
    fn missing_exemption_enables_fix_action() {
        let mut files = fixture();
        files.insert(
            "owners/a/repositories/svc.api.yaml".to_string(),
            canonical(
                "url: ssh://git@h/p/api.git\nmainline: main\nconfiguration:\n  refProtections:\n    branches:\n      - refMatcher: release/*\n        preventPushes: true\n",
            ),
        );
        let cfg = CheckConfig {
            expected_exemptions: vec![ExpectedExemption {
                target: ExemptionTarget::PreventPushes,
                ref_matcher: "release/*".to_string(),
                exempted_role: "@a.releases".to_string(),
            }],
            ..CheckConfig::default()
        };
        let report = validate_revision_files(&files, &cfg).expect("validate");
        assert!(report.needs_exemption_fix);
        assert!(report
            .annotations
            .iter()
            .any(|a| a.message.contains("@a.releases")));
    }
}
