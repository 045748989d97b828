// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Foreman - delegate tasks to isolated AI worker agents.
//!
//! Foreman runs named worker profiles as short-lived subprocesses,
//! parses their newline-delimited JSON event streams into typed
//! results, and coordinates three request shapes: a single worker, a
//! bounded parallel batch, and a sequential chain where each step sees
//! the previous step's answer. Sessions make single runs resumable and
//! background jobs let long work run detached.
//!
//! # Architecture
//!
//! - [`types`] - Core type definitions (messages, segments, usage)
//! - [`error`] - Error types and result alias
//! - [`config`] - Configuration loading and defaults
//! - [`profile`] - Worker profiles and the resolver seam
//! - [`session`] - Resumable sessions with RAII leases
//! - [`orchestrate`] - Driver, scheduler, job registry, orchestrator
//! - [`present`] - Terminal rendering
//! - [`telemetry`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use foreman::config::OrchestratorConfig;
//! use foreman::orchestrate::{ExecutionContext, Orchestrator, WorkRequest};
//! use foreman::profile::StaticResolver;
//!
//! let config = OrchestratorConfig::default();
//! let resolver = Arc::new(StaticResolver::from_profiles(config.profiles.clone()));
//! let orchestrator = Orchestrator::new(config, resolver)?;
//!
//! let outcome = orchestrator
//!     .execute(
//!         WorkRequest::Single {
//!             agent: "builder".into(),
//!             task: "fix the failing test".into(),
//!             resume: None,
//!         },
//!         ExecutionContext::new(std::env::current_dir()?),
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod orchestrate;
pub mod present;
pub mod profile;
pub mod session;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    ConfigError, DriverError, OrchestratorError, Result, SessionError, ValidationError,
};
pub use orchestrate::{
    DelegationOutcome, ExecutionContext, InvocationResult, Orchestrator, WorkRequest,
};
pub use profile::{ProfileResolver, ProfileScope, ScopeQuery, StaticResolver, WorkerProfile};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
