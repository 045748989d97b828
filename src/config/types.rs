// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types for the orchestrator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::profile::WorkerProfile;

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How worker processes are launched.
    pub worker: WorkerCommand,
    /// Concurrency limits.
    pub limits: Limits,
    /// Session retention settings.
    pub sessions: SessionSettings,
    /// Background job retention settings.
    pub jobs: JobSettings,
    /// Profiles defined directly in configuration.
    pub profiles: Vec<WorkerProfile>,
}

/// How the worker agent binary is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCommand {
    /// Executable name or path.
    pub program: String,
    /// Leading arguments placed before the protocol arguments.
    pub args: Vec<String>,
    /// Grace period between SIGTERM and SIGKILL on cancellation.
    pub grace_ms: u64,
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self {
            program: "foreman-worker".to_string(),
            args: Vec::new(),
            grace_ms: 5000,
        }
    }
}

/// Concurrency limits for parallel work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of items in a single parallel request.
    pub max_parallel_items: usize,
    /// Number of concurrent worker slots serving a parallel request.
    pub parallel_workers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_parallel_items: crate::orchestrate::MAX_PARALLEL_ITEMS,
            parallel_workers: crate::orchestrate::PARALLEL_WORKERS,
        }
    }
}

/// Session store retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Directory holding transcripts. Defaults to a subdirectory of the
    /// platform data directory when unset.
    pub dir: Option<PathBuf>,
    /// Sessions idle longer than this are evicted.
    pub max_idle_secs: u64,
    /// Oldest not-in-use sessions beyond this count are evicted.
    pub max_count: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_idle_secs: 7200,
            max_count: 24,
        }
    }
}

/// Background job registry retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Finished jobs older than this are swept.
    pub max_age_secs: u64,
    /// Oldest finished jobs beyond this count are swept.
    pub max_count: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_age_secs: 1800,
            max_count: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.worker.program, "foreman-worker");
        assert_eq!(config.worker.grace_ms, 5000);
        assert_eq!(config.limits.max_parallel_items, 8);
        assert_eq!(config.limits.parallel_workers, 4);
        assert_eq!(config.sessions.max_idle_secs, 7200);
        assert_eq!(config.sessions.max_count, 24);
        assert_eq!(config.jobs.max_count, 32);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
worker:
  program: /usr/local/bin/agent
limits:
  parallel_workers: 2
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.worker.program, "/usr/local/bin/agent");
        assert_eq!(config.worker.grace_ms, 5000);
        assert_eq!(config.limits.parallel_workers, 2);
        assert_eq!(config.limits.max_parallel_items, 8);
    }

    #[test]
    fn test_profiles_in_config() {
        let yaml = r#"
profiles:
  - name: tester
    scope: user
    tools: [run_tests]
    instructions: Run the test suite and report.
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].name, "tester");
        assert_eq!(config.profiles[0].tools, vec!["run_tests"]);
    }
}
