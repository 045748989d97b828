// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request and result types for delegated work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::profile::{ProfileScope, ScopeQuery, WorkerProfile};
use crate::types::{RunState, TranscriptMessage, UsageTotals};

/// Hard cap on items in one parallel request.
pub const MAX_PARALLEL_ITEMS: usize = 8;

/// Number of concurrent worker slots serving a parallel request.
pub const PARALLEL_WORKERS: usize = 4;

// ============================================================================
// Requests
// ============================================================================

/// One item of a parallel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelItem {
    pub agent: String,
    pub task: String,
}

/// One step of a chain request.
///
/// The task text may contain the literal `{previous}`, replaced with
/// the final text of the preceding step before the worker runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    pub agent: String,
    pub task: String,
}

/// A validated unit of delegated work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkRequest {
    /// One worker, optionally resuming a prior session.
    Single {
        agent: String,
        task: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume: Option<String>,
    },
    /// Independent items run concurrently.
    Parallel { items: Vec<ParallelItem> },
    /// Dependent steps run in order, each seeing the previous output.
    Chain { steps: Vec<ChainStep> },
}

impl WorkRequest {
    /// Validate shape constraints against the configured cap.
    pub fn validate(&self, max_parallel: usize) -> Result<(), ValidationError> {
        match self {
            Self::Single { task, .. } => {
                if task.trim().is_empty() {
                    return Err(ValidationError::EmptyTask);
                }
            }
            Self::Parallel { items } => {
                if items.is_empty() {
                    return Err(ValidationError::EmptyBatch);
                }
                if items.len() > max_parallel {
                    return Err(ValidationError::TooManyItems {
                        count: items.len(),
                        max: max_parallel,
                    });
                }
                if items.iter().any(|i| i.task.trim().is_empty()) {
                    return Err(ValidationError::EmptyTask);
                }
            }
            Self::Chain { steps } => {
                if steps.is_empty() {
                    return Err(ValidationError::EmptyChain);
                }
                if steps.iter().any(|s| s.task.trim().is_empty()) {
                    return Err(ValidationError::EmptyTask);
                }
            }
        }
        Ok(())
    }

    /// The shape tag of this request.
    pub fn shape(&self) -> RequestShape {
        match self {
            Self::Single { .. } => RequestShape::Single,
            Self::Parallel { .. } => RequestShape::Parallel,
            Self::Chain { .. } => RequestShape::Chain,
        }
    }

    /// Short human description, used as job metadata.
    pub fn describe(&self) -> (String, String) {
        match self {
            Self::Single { agent, task, .. } => (agent.clone(), truncate(task, 120)),
            Self::Parallel { items } => (
                format!("{} agents", items.len()),
                items
                    .first()
                    .map(|i| truncate(&i.task, 120))
                    .unwrap_or_default(),
            ),
            Self::Chain { steps } => (
                format!("{} steps", steps.len()),
                steps
                    .first()
                    .map(|s| truncate(&s.task, 120))
                    .unwrap_or_default(),
            ),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// Unvalidated request as received from callers. Exactly one of the
/// shape fields must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRequest {
    pub single: Option<SingleSpec>,
    pub parallel: Option<Vec<ParallelItem>>,
    pub chain: Option<Vec<ChainStep>>,
    /// Run detached as a background job.
    pub background: bool,
    /// Profile scopes consulted during resolution.
    pub scope: Option<ScopeQuery>,
}

/// The single-shape payload of a [`RawRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct SingleSpec {
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub resume: Option<String>,
}

impl RawRequest {
    /// Convert into a [`WorkRequest`], rejecting zero or multiple
    /// shapes.
    pub fn into_request(self) -> Result<WorkRequest, ValidationError> {
        match (self.single, self.parallel, self.chain) {
            (Some(s), None, None) => Ok(WorkRequest::Single {
                agent: s.agent,
                task: s.task,
                resume: s.resume,
            }),
            (None, Some(items), None) => Ok(WorkRequest::Parallel { items }),
            (None, None, Some(steps)) => Ok(WorkRequest::Chain { steps }),
            (None, None, None) => Err(ValidationError::MissingShape),
            _ => Err(ValidationError::AmbiguousShape),
        }
    }
}

/// Shape tag for a request or outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestShape {
    Single,
    Parallel,
    Chain,
}

impl std::fmt::Display for RequestShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Single => "single",
            Self::Parallel => "parallel",
            Self::Chain => "chain",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one worker invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    /// Profile name the invocation ran under.
    pub agent: String,
    /// Scope of the resolved profile, when one was found.
    pub scope: Option<ProfileScope>,
    /// The task text the worker received.
    pub task: String,
    /// Process exit code, `None` when the process never ran or was
    /// killed by signal.
    pub exit_code: Option<i32>,
    /// Whether the worker process ran to completion.
    pub completed: bool,
    /// Transcript messages folded from the event stream.
    pub messages: Vec<TranscriptMessage>,
    /// Accumulated usage.
    pub usage: UsageTotals,
    /// Model the worker reported, falling back to the profile hint.
    pub model: Option<String>,
    /// Terminal state.
    pub state: RunState,
    /// Error description when the invocation failed.
    pub error: Option<String>,
    /// Position within a chain, when part of one.
    pub step_index: Option<usize>,
    /// Session the invocation ran in, when session-bound.
    pub session_id: Option<String>,
}

impl InvocationResult {
    /// A result in its initial state, before any events arrive.
    pub fn pending(profile: &WorkerProfile, task: impl Into<String>) -> Self {
        Self {
            agent: profile.name.clone(),
            scope: Some(profile.scope),
            task: task.into(),
            exit_code: None,
            completed: false,
            messages: Vec::new(),
            usage: UsageTotals::default(),
            model: profile.model.clone(),
            state: RunState::Error,
            error: None,
            step_index: None,
            session_id: None,
        }
    }

    /// A failure produced without spawning a worker, for precondition
    /// errors like an unknown profile or an unavailable session.
    pub fn precondition_failure(
        agent: impl Into<String>,
        scope: Option<ProfileScope>,
        task: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            scope,
            task: task.into(),
            exit_code: None,
            completed: false,
            messages: Vec::new(),
            usage: UsageTotals::default(),
            model: None,
            state: RunState::Error,
            error: Some(reason.into()),
            step_index: None,
            session_id: None,
        }
    }

    /// Text of the last assistant message, the invocation's answer.
    pub fn final_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::Assistant)
            .map(|m| m.plain_text())
            .filter(|t| !t.is_empty())
    }

    /// Whether the invocation ran to completion successfully.
    pub fn is_success(&self) -> bool {
        self.completed && self.exit_code == Some(0) && self.state.is_ok()
    }

    /// Number of assistant turns observed.
    pub fn turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == crate::types::Role::Assistant)
            .count()
    }
}

/// Aggregate progress of a parallel request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParallelProgress {
    pub completed: usize,
    pub running: usize,
    pub total: usize,
}

/// Completed parallel request: results in item order.
#[derive(Debug, Clone, Serialize)]
pub struct ParallelOutcome {
    pub results: Vec<InvocationResult>,
    pub succeeded: usize,
}

/// Why a chain stopped early.
#[derive(Debug, Clone, Serialize)]
pub struct ChainFailure {
    pub step_index: usize,
    pub agent: String,
    pub reason: String,
}

/// Completed chain: steps that ran, plus the failure that stopped it
/// if one did. On failure at step `k`, `steps` holds `k` successful
/// results followed by the failed one.
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutcome {
    pub steps: Vec<InvocationResult>,
    pub failure: Option<ChainFailure>,
}

/// Outcome of a whole delegated request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationOutcome {
    Single(InvocationResult),
    Parallel(ParallelOutcome),
    Chain(ChainOutcome),
}

impl DelegationOutcome {
    pub fn shape(&self) -> RequestShape {
        match self {
            Self::Single(_) => RequestShape::Single,
            Self::Parallel(_) => RequestShape::Parallel,
            Self::Chain(_) => RequestShape::Chain,
        }
    }

    /// One-line summary for job listings.
    pub fn summary(&self) -> String {
        match self {
            Self::Single(result) => {
                if result.is_success() {
                    format!("{}: done in {} turns", result.agent, result.turns())
                } else {
                    format!(
                        "{}: failed ({})",
                        result.agent,
                        result.error.as_deref().unwrap_or("unknown error")
                    )
                }
            }
            Self::Parallel(outcome) => format!(
                "{}/{} items succeeded",
                outcome.succeeded,
                outcome.results.len()
            ),
            Self::Chain(outcome) => match &outcome.failure {
                None => format!("{} steps completed", outcome.steps.len()),
                Some(failure) => format!(
                    "stopped at step {} ({}): {}",
                    failure.step_index + 1,
                    failure.agent,
                    failure.reason
                ),
            },
        }
    }
}

// ============================================================================
// Progress reporting
// ============================================================================

/// Callback invoked as a running invocation makes progress.
pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A point-in-time view of a running invocation.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub agent: String,
    pub step_index: Option<usize>,
    pub turns: usize,
    pub latest_text: Option<String>,
    /// Present when the invocation is part of a parallel batch.
    pub aggregate: Option<ParallelProgress>,
}

impl ProgressEvent {
    /// Build an event from a partially folded result.
    pub fn from_result(result: &InvocationResult) -> Self {
        Self {
            agent: result.agent.clone(),
            step_index: result.step_index,
            turns: result.turns(),
            latest_text: result.final_text(),
            aggregate: None,
        }
    }

    /// Short human rendering for job snapshots.
    pub fn snapshot(&self) -> String {
        let mut text = match self.step_index {
            Some(index) => format!("[step {}] {}: turn {}", index + 1, self.agent, self.turns),
            None => format!("{}: turn {}", self.agent, self.turns),
        };
        if let Some(aggregate) = &self.aggregate {
            text.push_str(&format!(
                " ({}/{} done)",
                aggregate.completed, aggregate.total
            ));
        }
        if let Some(latest) = &self.latest_text {
            text.push_str(": ");
            text.push_str(&truncate(latest, 80));
        }
        text
    }
}
