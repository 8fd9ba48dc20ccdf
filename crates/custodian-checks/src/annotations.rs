// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
}

/// One line-anchored finding on a file of the candidate revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Annotation {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub level: AnnotationLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Annotation {
    #[must_use]
    pub fn failure(path: &str, line: u32, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            start_line: line,
            end_line: line,
            level: AnnotationLevel::Failure,
            message: message.into(),
            title: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// Turns a strict-parse failure into an annotation. The structured location
/// is preferred; otherwise the message is probed with the
/// `(?:yaml: )?line (\d+): (.*)` pattern and finally anchored at line 1
/// with an "unparsable" title.
#[must_use]
pub fn annotation_from_parse_error(path: &str, err: &serde_yaml::Error) -> Annotation {
    if let Some(location) = err.location() {
        let line = u32::try_from(location.line()).unwrap_or(1).max(1);
        return Annotation::failure(path, line, err.to_string());
    }
    let message = err.to_string();
    if let Some(caps) = Regex::new(r"(?:yaml: )?line (\d+): (.*)")
        .ok()
        .and_then(|re| re.captures(&message))
    {
        let line = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);
        let detail = caps.get(2).map_or(message.as_str(), |m| m.as_str());
        return Annotation::failure(path, line, detail.to_string());
    }
    Annotation::failure(path, 1, message).with_title("unparsable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_the_offending_line() {
        let err = serde_yaml::from_str::<custodian_model::OwnerFile>(
            "contact: x@example.com\nbogus: 1\n",
        )
        .expect_err("unknown field");
        let annotation = annotation_from_parse_error("owners/a/owner.info.yaml", &err);
        assert_eq!(annotation.level, AnnotationLevel::Failure);
        assert!(annotation.start_line >= 1);
        assert!(annotation.message.contains("bogus"));
    }

    #[test]
    fn unlocatable_error_falls_back_to_line_one() {
        let err = serde_yaml::from_str::<custodian_model::OwnerFile>("").expect_err("empty");
        let annotation = annotation_from_parse_error("owners/a/owner.info.yaml", &err);
        assert_eq!(annotation.start_line, 1);
    }
}
