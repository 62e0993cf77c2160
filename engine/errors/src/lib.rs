//! Error kinds returned by the encrypted search engine.
//!
//! Mirrors the policy in the design doc: storage and corruption failures
//! propagate to the caller, integrity warnings (`MissingToken`) are logged
//! and dropped by callers rather than returned as errors, and cryptographic
//! primitive misuse (bad key lengths) is a programmer error that panics
//! instead of appearing here.

use std::path::PathBuf;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// The `§7 ERROR HANDLING DESIGN` kinds.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("missing state: required file or directory `{0}` not found while opening an existing client/server")]
    MissingState(PathBuf),

    #[error("corrupt state in `{path}`: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(&'static str),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("transport failed: {0}")]
    TransportFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    pub fn missing_state(path: impl Into<PathBuf>) -> Self {
        EngineError::MissingState(path.into())
    }

    pub fn corrupt_state(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let err = EngineError::missing_state("/tmp/x/tdp_sk.key");
        assert!(err.to_string().contains("tdp_sk.key"));
    }
}
