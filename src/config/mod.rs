// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the orchestrator: worker command, limits, session
//! and job retention, and configuration-defined profiles.

mod loader;
mod types;

pub use loader::{load_config, load_file, user_config_path, PROJECT_CONFIG};
pub use types::{JobSettings, Limits, OrchestratorConfig, SessionSettings, WorkerCommand};
