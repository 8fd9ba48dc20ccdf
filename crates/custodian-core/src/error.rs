// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Error taxonomy shared by every layer of the service. Callers branch on
/// the kind, never on the concrete source of the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyExists,
    Concurrency,
    Referenced,
    BadRequest,
    DownstreamUnavailable,
    NoChanges,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::Concurrency => "concurrency",
            Self::Referenced => "referenced",
            Self::BadRequest => "bad-request",
            Self::DownstreamUnavailable => "downstream-unavailable",
            Self::NoChanges => "no-changes",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    /// Refreshed current record for conflict responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
            current: None,
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    #[must_use]
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Concurrency, message)
    }

    #[must_use]
    pub fn referenced(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Referenced, message)
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    #[must_use]
    pub fn downstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DownstreamUnavailable, message)
    }

    #[must_use]
    pub fn no_changes() -> Self {
        Self::new(ErrorKind::NoChanges, "commit produced no changes")
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Attach the refreshed current record so conflict responses can return
    /// it to the caller.
    #[must_use]
    pub fn with_current(mut self, current: Value) -> Self {
        self.current = Some(current);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn is_no_changes(&self) -> bool {
        matches!(self.kind, ErrorKind::NoChanges)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_kind_and_message() {
        let err = Error::concurrency("push rejected").with_detail("commitHash", "abc");
        assert_eq!(err.to_string(), "concurrency: push rejected");
        assert_eq!(err.details.get("commitHash").map(String::as_str), Some("abc"));
    }

    #[test]
    fn no_changes_is_distinguishable() {
        assert!(Error::no_changes().is_no_changes());
        assert!(!Error::internal("x").is_no_changes());
    }
}
