// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Concurrency scheduling over the driver.
//!
//! Parallel requests run on a small pool of pullers sharing an atomic
//! cursor; results land in per-item slots so output order always
//! matches request order regardless of completion order. Chains run
//! strictly sequentially, threading each step's final text into the
//! next step's task.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Limits;
use crate::error::DriverError;
use crate::profile::WorkerProfile;

use super::driver::WorkerDriver;
use super::types::{
    ChainFailure, ChainOutcome, InvocationResult, ParallelOutcome, ParallelProgress,
    ProgressEvent, ProgressFn,
};

/// Placeholder substituted with the previous step's final text.
pub const PREVIOUS_PLACEHOLDER: &str = "{previous}";

/// A resolved unit of work handed to the scheduler. An `Err` profile
/// carries the precondition that failed; the scheduler records it as a
/// failed result without spawning anything.
pub struct WorkUnit {
    pub agent: String,
    pub task: String,
    pub profile: Result<Arc<WorkerProfile>, String>,
}

/// Runs resolved work units under the configured concurrency limits.
pub struct Scheduler {
    driver: Arc<WorkerDriver>,
    limits: Limits,
}

impl Scheduler {
    pub fn new(driver: Arc<WorkerDriver>, limits: Limits) -> Self {
        Self { driver, limits }
    }

    /// Run independent units concurrently, preserving input order in
    /// the output.
    pub async fn run_parallel(
        &self,
        units: Vec<WorkUnit>,
        cwd: &Path,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<ParallelOutcome, DriverError> {
        let total = units.len();
        let units = Arc::new(units);
        let slots: Arc<Mutex<Vec<Option<InvocationResult>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let cursor = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));

        let workers = self.limits.parallel_workers.max(1).min(total);
        debug!(total, workers, "starting parallel batch");

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let units = Arc::clone(&units);
            let slots = Arc::clone(&slots);
            let cursor = Arc::clone(&cursor);
            let completed = Arc::clone(&completed);
            let running = Arc::clone(&running);
            let driver = Arc::clone(&self.driver);
            let cancel = cancel.clone();
            let progress = progress.clone();
            let cwd = cwd.to_path_buf();

            pool.spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= units.len() || cancel.is_cancelled() {
                        return;
                    }
                    let unit = &units[index];
                    running.fetch_add(1, Ordering::SeqCst);

                    let item_progress = progress.as_ref().map(|outer| {
                        let outer = Arc::clone(outer);
                        let completed = Arc::clone(&completed);
                        let running = Arc::clone(&running);
                        Arc::new(move |mut event: ProgressEvent| {
                            event.aggregate = Some(ParallelProgress {
                                completed: completed.load(Ordering::SeqCst),
                                running: running.load(Ordering::SeqCst),
                                total,
                            });
                            outer(event);
                        }) as ProgressFn
                    });

                    let result = match &unit.profile {
                        Err(reason) => InvocationResult::precondition_failure(
                            &unit.agent,
                            None,
                            &unit.task,
                            reason.clone(),
                        ),
                        Ok(profile) => {
                            match driver
                                .run(
                                    Arc::clone(profile),
                                    &unit.task,
                                    &cwd,
                                    None,
                                    cancel.clone(),
                                    item_progress,
                                )
                                .await
                            {
                                Ok(result) => result,
                                Err(DriverError::Aborted) => {
                                    let mut result = InvocationResult::precondition_failure(
                                        &unit.agent,
                                        Some(profile.scope),
                                        &unit.task,
                                        "aborted",
                                    );
                                    result.state = crate::types::RunState::Aborted;
                                    result
                                }
                                Err(err) => {
                                    warn!(agent = %unit.agent, %err, "parallel item failed");
                                    InvocationResult::precondition_failure(
                                        &unit.agent,
                                        Some(profile.scope),
                                        &unit.task,
                                        err.to_string(),
                                    )
                                }
                            }
                        }
                    };

                    running.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                    slots[index] = Some(result);
                }
            });
        }

        while pool.join_next().await.is_some() {}

        if cancel.is_cancelled() {
            return Err(DriverError::Aborted);
        }

        let slots = Arc::try_unwrap(slots)
            .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_else(|shared| {
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            });
        let results: Vec<InvocationResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    InvocationResult::precondition_failure(
                        "unknown",
                        None,
                        format!("item {index}"),
                        "item was never scheduled",
                    )
                })
            })
            .collect();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Ok(ParallelOutcome { results, succeeded })
    }

    /// Run dependent steps in order.
    ///
    /// Each step's task has [`PREVIOUS_PLACEHOLDER`] replaced with the
    /// final text of the preceding step. A failed step stops the chain;
    /// its result is the last element of the outcome.
    pub async fn run_chain(
        &self,
        units: Vec<WorkUnit>,
        cwd: &Path,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<ChainOutcome, DriverError> {
        let mut steps: Vec<InvocationResult> = Vec::with_capacity(units.len());
        let mut previous = String::new();

        for (index, unit) in units.into_iter().enumerate() {
            let task = unit.task.replace(PREVIOUS_PLACEHOLDER, &previous);

            let step_progress = progress.as_ref().map(|outer| {
                let outer = Arc::clone(outer);
                Arc::new(move |mut event: ProgressEvent| {
                    event.step_index = Some(index);
                    outer(event);
                }) as ProgressFn
            });

            let mut result = match &unit.profile {
                Err(reason) => InvocationResult::precondition_failure(
                    &unit.agent,
                    None,
                    &task,
                    reason.clone(),
                ),
                Ok(profile) => match self
                    .driver
                    .run(
                        Arc::clone(profile),
                        &task,
                        cwd,
                        None,
                        cancel.clone(),
                        step_progress,
                    )
                    .await
                {
                    Ok(result) => result,
                    Err(DriverError::Aborted) => return Err(DriverError::Aborted),
                    Err(err) => {
                        warn!(agent = %unit.agent, step = index, %err, "chain step failed");
                        InvocationResult::precondition_failure(
                            &unit.agent,
                            Some(profile.scope),
                            &task,
                            err.to_string(),
                        )
                    }
                },
            };
            result.step_index = Some(index);

            if !result.is_success() {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "step did not complete successfully".to_string());
                let agent = result.agent.clone();
                steps.push(result);
                return Ok(ChainOutcome {
                    steps,
                    failure: Some(ChainFailure {
                        step_index: index,
                        agent,
                        reason,
                    }),
                });
            }

            previous = result.final_text().unwrap_or_default();
            steps.push(result);
        }

        Ok(ChainOutcome {
            steps,
            failure: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerCommand;
    use crate::profile::ProfileScope;

    // A fake worker: sh -c runs the script with driver-appended
    // protocol arguments landing in "$@".
    fn sh_driver(script: &str) -> Arc<WorkerDriver> {
        Arc::new(WorkerDriver::new(WorkerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
            grace_ms: 200,
        }))
    }

    // Emits one assistant message whose text is the --task argument.
    const ECHO_TASK: &str = r#"
task=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--task" ]; then task="$2"; shift; fi
  shift
done
printf '{"type":"message","role":"assistant","segments":[{"type":"text","text":"%s"}]}\n' "$task"
"#;

    fn unit(agent: &str, task: &str) -> WorkUnit {
        WorkUnit {
            agent: agent.to_string(),
            task: task.to_string(),
            profile: Ok(Arc::new(WorkerProfile::new(agent, ProfileScope::User))),
        }
    }

    fn scheduler(script: &str) -> Scheduler {
        Scheduler::new(sh_driver(script), Limits::default())
    }

    #[tokio::test]
    async fn test_parallel_preserves_order() {
        // Later items finish first; output order must still match input.
        let script = r#"
task=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--task" ]; then task="$2"; shift; fi
  shift
done
case "$task" in
  a) sleep 0.3 ;;
  b) sleep 0.1 ;;
esac
printf '{"type":"message","role":"assistant","segments":[{"type":"text","text":"%s"}]}\n' "$task"
"#;
        let scheduler = scheduler(script);
        let units = vec![unit("w", "a"), unit("w", "b"), unit("w", "c")];
        let outcome = scheduler
            .run_parallel(
                units,
                &std::env::temp_dir(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 3);
        let texts: Vec<String> = outcome
            .results
            .iter()
            .map(|r| r.final_text().unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_parallel_unknown_profile_recorded() {
        let scheduler = scheduler(ECHO_TASK);
        let units = vec![
            unit("w", "ok"),
            WorkUnit {
                agent: "ghost".to_string(),
                task: "never runs".to_string(),
                profile: Err("unknown agent profile: ghost".to_string()),
            },
        ];
        let outcome = scheduler
            .run_parallel(
                units,
                &std::env::temp_dir(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert!(outcome.results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("unknown agent profile"));
    }

    #[tokio::test]
    async fn test_parallel_cancel_propagates() {
        let scheduler = scheduler("sleep 30");
        let cancel = CancellationToken::new();
        let early = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            early.cancel();
        });
        let units = vec![unit("w", "a"), unit("w", "b")];
        let err = scheduler
            .run_parallel(units, &std::env::temp_dir(), cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Aborted));
    }

    #[tokio::test]
    async fn test_chain_threads_previous() {
        let scheduler = scheduler(ECHO_TASK);
        let units = vec![
            unit("w", "alpha"),
            unit("w", "got: {previous}"),
            unit("w", "finally {previous}"),
        ];
        let outcome = scheduler
            .run_chain(
                units,
                &std::env::temp_dir(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert!(outcome.failure.is_none());
        assert_eq!(
            outcome.steps[1].final_text().as_deref(),
            Some("got: alpha")
        );
        assert_eq!(
            outcome.steps[2].final_text().as_deref(),
            Some("finally got: alpha")
        );
    }

    #[tokio::test]
    async fn test_chain_stops_on_failure() {
        // Second step exits nonzero.
        let script = r#"
task=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--task" ]; then task="$2"; shift; fi
  shift
done
if [ "$task" = "fail" ]; then echo "step broke" >&2; exit 1; fi
printf '{"type":"message","role":"assistant","segments":[{"type":"text","text":"%s"}]}\n' "$task"
"#;
        let scheduler = scheduler(script);
        let units = vec![unit("w", "one"), unit("w", "fail"), unit("w", "three")];
        let outcome = scheduler
            .run_chain(
                units,
                &std::env::temp_dir(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.step_index, 1);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps[0].is_success());
        assert!(!outcome.steps[1].is_success());
    }

    #[tokio::test]
    async fn test_chain_unknown_profile_stops() {
        let scheduler = scheduler(ECHO_TASK);
        let units = vec![
            WorkUnit {
                agent: "ghost".to_string(),
                task: "x".to_string(),
                profile: Err("unknown agent profile: ghost".to_string()),
            },
            unit("w", "never"),
        ];
        let outcome = scheduler
            .run_chain(
                units,
                &std::env::temp_dir(),
                CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.failure.unwrap().step_index, 0);
    }
}
