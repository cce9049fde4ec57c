//! Error types for the transliteration harness

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    #[error("Driver error during {stage}: {reason}")]
    Driver { stage: Stage, reason: String },

    #[error("Artifact write failed for {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout waiting for: {what}")]
    Timeout { stage: Option<Stage>, what: String },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Service at {url} not reachable after {attempts} attempts")]
    Preflight { url: String, attempts: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

impl E2eError {
    pub fn driver(stage: Stage, reason: impl Into<String>) -> Self {
        E2eError::Driver {
            stage,
            reason: reason.into(),
        }
    }

    /// A timeout not yet attributed to a stage
    pub fn timeout(what: impl Into<String>) -> Self {
        E2eError::Timeout {
            stage: None,
            what: what.into(),
        }
    }

    /// Attribute the error to `stage` unless it already carries one.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            E2eError::Driver { .. } | E2eError::Timeout { stage: Some(_), .. } => self,
            E2eError::Timeout { stage: None, what } => E2eError::Timeout {
                stage: Some(stage),
                what,
            },
            other => E2eError::driver(stage, other.to_string()),
        }
    }

    /// Stage at which the error surfaced, when the error carries one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            E2eError::Driver { stage, .. } => Some(*stage),
            E2eError::Timeout { stage, .. } => *stage,
            E2eError::ArtifactWrite { .. } => Some(Stage::Capture),
            _ => None,
        }
    }

    /// Classify the error for per-case reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            E2eError::Timeout { .. } => FailureKind::Timeout,
            E2eError::ArtifactWrite { .. } => FailureKind::ArtifactWrite,
            _ => FailureKind::Driver,
        }
    }
}

/// Table integrity violations. Any of these aborts the run before a case is driven.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    #[error("duplicate case id '{0}'")]
    DuplicateId(String),

    #[error("case '{0}' has an empty expected value")]
    EmptyExpected(String),

    #[error("case id '{0}' does not match <Pos|Neg>_<Kind>_<Sequence>")]
    MalformedId(String),

    #[error("negative case '{id}' must expect its input unchanged")]
    PassThroughMismatch { id: String },

    #[error("case '{id}' has category '{category}' which is not a safe path component")]
    UnsafeCategory { id: String, category: String },

    #[error("fixture contains no cases")]
    EmptyTable,
}

/// Where in a case's execution something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Session,
    Navigate,
    Readiness,
    LocateInput,
    LocateOutput,
    Clear,
    Inject,
    Trigger,
    ReadOutput,
    Capture,
    Presence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Session => "session",
            Stage::Navigate => "navigate",
            Stage::Readiness => "readiness",
            Stage::LocateInput => "locate-input",
            Stage::LocateOutput => "locate-output",
            Stage::Clear => "clear",
            Stage::Inject => "inject",
            Stage::Trigger => "trigger",
            Stage::ReadOutput => "read-output",
            Stage::Capture => "capture",
            Stage::Presence => "presence",
        };
        f.write_str(name)
    }
}

/// Reported failure category of a case that did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Driver,
    ArtifactWrite,
    Timeout,
    AssertionMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        let err = E2eError::driver(Stage::LocateInput, "no match");
        assert_eq!(err.failure_kind(), FailureKind::Driver);
        assert_eq!(err.stage(), Some(Stage::LocateInput));

        let err = E2eError::timeout("output");
        assert_eq!(err.failure_kind(), FailureKind::Timeout);
        assert_eq!(err.stage(), None);

        let err = E2eError::ArtifactWrite {
            path: PathBuf::from("screenshots/x/y.png"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.failure_kind(), FailureKind::ArtifactWrite);
        assert_eq!(err.stage(), Some(Stage::Capture));
    }

    #[test]
    fn test_driver_error_message_names_stage() {
        let err = E2eError::driver(Stage::LocateOutput, "selector matched nothing");
        assert_eq!(
            err.to_string(),
            "Driver error during locate-output: selector matched nothing"
        );
    }

    #[test]
    fn test_at_stage_keeps_first_attribution() {
        let err = E2eError::timeout("output surface").at_stage(Stage::ReadOutput);
        assert_eq!(err.stage(), Some(Stage::ReadOutput));
        assert_eq!(err.failure_kind(), FailureKind::Timeout);

        let err = err.at_stage(Stage::Session);
        assert_eq!(err.stage(), Some(Stage::ReadOutput));

        let err = E2eError::Playwright("target closed".into()).at_stage(Stage::Clear);
        assert_eq!(err.failure_kind(), FailureKind::Driver);
        assert_eq!(err.stage(), Some(Stage::Clear));
    }
}
