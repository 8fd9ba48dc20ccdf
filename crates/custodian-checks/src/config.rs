// SPDX-License-Identifier: Apache-2.0

use custodian_model::NameRules;
use std::path::PathBuf;
use std::time::Duration;

/// Which exemption list an expected-exemption rule applies to. New
/// protection kinds must be added here and in the fix rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExemptionTarget {
    RequireCondition { key: String },
    PreventAllChanges,
    PreventCreation,
    PreventDeletion,
    PreventPushes,
    PreventForcePushes,
}

/// A rule stating that matching ref-protection or require-condition entries
/// must carry a given role exemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedExemption {
    pub target: ExemptionTarget,
    pub ref_matcher: String,
    pub exempted_role: String,
}

#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub check_name: String,
    pub remote_url: String,
    pub ssh_key_path: Option<PathBuf>,
    pub name_rules: NameRules,
    pub expected_exemptions: Vec<ExpectedExemption>,
    /// Prefix for commits created by the suggested fix actions.
    pub fix_message_prefix: String,
    pub run_deadline: Duration,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            check_name: crate::CHECK_RUN_NAME.to_string(),
            remote_url: String::new(),
            ssh_key_path: None,
            name_rules: NameRules::default(),
            expected_exemptions: Vec::new(),
            fix_message_prefix: "META-0: metadata auto-fix".to_string(),
            run_deadline: Duration::from_secs(60),
        }
    }
}
