// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub const CRATE_NAME: &str = "custodian-checks";

pub const CHECK_RUN_NAME: &str = "only-valid-metadata-changes";

mod annotations;
mod checkrun;
mod client;
mod config;
mod fixes;
mod format;
mod walker;

pub use annotations::{annotation_from_parse_error, Annotation, AnnotationLevel};
pub use checkrun::{
    CheckConclusion, CheckRunHost, CheckRunOutput, CheckRunner, SuggestedAction,
};
pub use client::HostedCheckClient;
pub use config::{CheckConfig, ExemptionTarget, ExpectedExemption};
pub use fixes::{apply_exemption_fix, apply_formatting_fix, FixAuthor};
pub use format::canonicalize_yaml;
pub use walker::{validate_revision_files, RevisionFiles, ValidationReport};

impl walker::RevisionFiles for custodian_git::RevisionTree {
    fn paths(&self) -> Result<Vec<String>, custodian_core::Error> {
        custodian_git::RevisionTree::paths(self)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, custodian_core::Error> {
        custodian_git::RevisionTree::read(self, path)
    }
}
