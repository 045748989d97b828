// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logging setup.
//!
//! Logs go to stderr so worker output and rendered results own stdout.
//! Initialize once at startup and keep the guard alive:
//!
//! ```rust,ignore
//! use foreman::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
