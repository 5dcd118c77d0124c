// src/core/errors.rs

//! Defines the primary error type for the decision and lifecycle engine.

use thiserror::Error;

/// The main error enum for the engine, covering the failure kinds in the error
/// handling design: malformed client input, fatal startup conditions, transient
/// state-store I/O, command execution failures, and invariant violations.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Malformed or incomplete client request. Maps to HTTP 400.
    #[error("{0}")]
    BadRequest(String),

    /// Unrecoverable condition detected at startup (bad config, unwritable
    /// state dir, missing TLS material). The process should terminate.
    #[error("{0}")]
    ConfigFatal(String),

    /// A read of ack/cluster state failed or produced unparseable JSON.
    /// Callers treat the record as absent and proceed; this variant exists
    /// so the failure is still logged with its cause.
    #[error("{0}")]
    TransientIo(String),

    /// A templated command could not be spawned or returned non-zero and the
    /// caller requested `tolerate_failure = false`.
    #[error("{0}")]
    CommandFailed(String),

    /// A bug indicator: an operation assumed state that didn't hold (e.g.
    /// `modify_cluster(remove)` against a cluster state file that doesn't
    /// exist). Always logged as fatal; callers should not recover silently.
    #[error("{0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn config_fatal(msg: impl Into<String>) -> Self {
        Self::ConfigFatal(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
