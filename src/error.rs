//! Error taxonomy for registry and install operations.
//!
//! Application code passes `anyhow::Error` around; these typed errors are
//! attached at the boundary where the failure happens so callers can
//! `downcast_ref::<PackageError>()` to decide how to report it.

use thiserror::Error;

use crate::http::NonRetryableError;
use crate::version::VersionError;

#[derive(Debug, Error)]
pub enum PackageError {
    /// Request failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed JSON or version string.
    #[error("parse error: {0}")]
    Parse(String),

    /// Corrupt or missing tarball, extraction failure.
    #[error("archive error: {0}")]
    Archive(String),

    /// Permission or missing path.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// No candidate version satisfies a range.
    #[error("no version of {package} satisfies '{range}'")]
    DependencyUnsatisfiable { package: String, range: String },

    #[error("package {0} is not installed")]
    NotInstalled(String),
}

impl PackageError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn filesystem(msg: impl Into<String>) -> Self {
        Self::Filesystem(msg.into())
    }

    pub fn unsatisfiable(package: impl Into<String>, range: impl Into<String>) -> Self {
        Self::DependencyUnsatisfiable {
            package: package.into(),
            range: range.into(),
        }
    }
}

impl From<VersionError> for PackageError {
    fn from(e: VersionError) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Short classification of an error chain for user-facing messages.
pub fn kind_of(e: &anyhow::Error) -> &'static str {
    if e.downcast_ref::<NonRetryableError>().is_some() {
        return "network";
    }
    match e.downcast_ref::<PackageError>() {
        Some(PackageError::Network(_)) => "network",
        Some(PackageError::Parse(_)) => "parse",
        Some(PackageError::Archive(_)) => "archive",
        Some(PackageError::Filesystem(_)) => "filesystem",
        Some(PackageError::DependencyUnsatisfiable { .. }) => "dependency",
        Some(PackageError::NotInstalled(_)) => "not installed",
        None => "error",
    }
}
