// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the Foreman orchestrator.
//!
//! This module provides strongly-typed errors for different parts of the
//! application, using `thiserror` for ergonomic error definitions and
//! `anyhow` for error propagation.
//!
//! Policy: request-shape and bound violations are raised as typed errors
//! before any subprocess exists. Profile and session precondition failures
//! are folded into synthetic failed results by the orchestrator. Process
//! failures are captured into the invocation result, except aborts, which
//! always surface as [`DriverError::Aborted`] so a cancelled run can never
//! be mistaken for a completed one.

use thiserror::Error;

/// Errors raised while validating a work request, before any spawn.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("request names no work shape: provide exactly one of single, parallel, or chain")]
    MissingShape,

    #[error("request names more than one work shape")]
    AmbiguousShape,

    #[error("task text must not be empty")]
    EmptyTask,

    #[error("parallel batch is empty")]
    EmptyBatch,

    #[error("chain has no steps")]
    EmptyChain,

    #[error("parallel batch of {count} items exceeds the limit of {max}")]
    TooManyItems { count: usize, max: usize },
}

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {id} belongs to agent '{owner}', not '{requested}'")]
    OwnerMismatch {
        id: String,
        owner: String,
        requested: String,
    },

    #[error("session {0} is already in use by another invocation")]
    InUse(String),

    #[error("session {0} has no backing transcript; stale entry removed")]
    MissingTranscript(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors that can occur while driving a worker subprocess.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(String),

    #[error("invocation aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("IO error reading config: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Top-level errors returned by the orchestrator facade.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl OrchestratorError {
    /// True when the request was cancelled rather than failed.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Driver(DriverError::Aborted))
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
