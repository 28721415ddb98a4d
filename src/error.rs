//! Crate-level error types.
//!
//! Only [`ConfigError`] is fatal. Every other error is caught where the risky
//! operation happens and rendered as an inline notice.

use std::path::PathBuf;

use thiserror::Error;

use crate::phase::Phase;

/// Startup configuration failures. These halt the process before the
/// listener binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} not found. Set the {env} environment variable or add it to the secrets file.")]
    MissingSecret { name: &'static str, env: &'static str },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("condition registry is empty")]
    EmptyRegistry,

    #[error("duplicate condition id '{0}'")]
    DuplicateCondition(String),

    #[error("invalid value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// Failures of the completion provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to completion provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion provider returned a malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("completion provider response had no message content")]
    EmptyResponse,
}

/// Participant actions that are not valid for the current session state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("'{action}' is not available during {phase}")]
    WrongPhase { action: &'static str, phase: Phase },

    #[error("please enter your participant ID")]
    EmptyParticipantId,

    #[error("participant '{0}' is already logged in")]
    AlreadyLoggedIn(String),

    #[error("no participant logged in")]
    NotLoggedIn,

    #[error("message is empty")]
    EmptyMessage,

    #[error("unknown condition '{0}'")]
    UnknownCondition(String),
}

/// Chat exchange failures: either the exchange was never started, or the
/// provider failed after the user turn was recorded.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Missing or unreadable guideline image.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset name '{0}' is not a plain file name")]
    InvalidName(String),

    #[error("guideline image '{name}' could not be loaded: {source}")]
    Unavailable {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Admin panel failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("incorrect admin password")]
    Locked,

    #[error("admin session expired; enter the password again")]
    Expired,

    #[error("no participant logged in; nothing to export")]
    NothingToExport,
}

/// Top-level error for the binary and the server loop.
#[derive(Debug, Error)]
pub enum StudyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed HTTP request: {0}")]
    Http(String),
}

impl From<httparse::Error> for StudyError {
    fn from(e: httparse::Error) -> Self {
        StudyError::Http(e.to_string())
    }
}
