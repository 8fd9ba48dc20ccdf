// SPDX-License-Identifier: Apache-2.0

use custodian_core::Error;
use similar::TextDiff;

/// Canonical rendering of a YAML document: parsed into a value tree and
/// re-serialised, which normalises indentation, quoting, and spacing while
/// preserving key order.
pub fn canonicalize_yaml(source: &str) -> Result<String, Error> {
    let value: serde_yaml::Value = serde_yaml::from_str(source)
        .map_err(|e| Error::validation(format!("yaml parse failed: {e}")))?;
    serde_yaml::to_string(&value).map_err(|e| Error::internal(format!("yaml render failed: {e}")))
}

/// Unified diff between the committed text and its canonical form, empty
/// when the file is already canonical.
pub fn formatting_diff(path: &str, source: &str, formatted: &str) -> Option<String> {
    if source == formatted {
        return None;
    }
    let diff = TextDiff::from_lines(source, formatted)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();
    Some(diff)
}
