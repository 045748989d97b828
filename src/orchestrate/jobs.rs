// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background job registry.
//!
//! Submitted jobs get an id immediately and run detached. Status is
//! monotonic: once a job is terminal it never changes again, even if a
//! late completion races a cancellation. Finished jobs are swept by
//! age and count whenever a new job is created.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::JobSettings;

use super::types::{DelegationOutcome, RequestShape};

/// Lifecycle state of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Latest progress text reported by a running job.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub text: String,
    pub at: DateTime<Utc>,
}

/// One background job record.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundJob {
    pub id: String,
    pub status: JobStatus,
    /// Agent description from the request.
    pub agent: String,
    /// Task description from the request.
    pub task: String,
    pub shape: RequestShape,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub snapshot: Option<ProgressSnapshot>,
    pub result: Option<DelegationOutcome>,
    pub error: Option<String>,
    #[serde(skip)]
    cancel: CancellationToken,
}

type Shared = Arc<RwLock<HashMap<String, BackgroundJob>>>;

/// Called once when a job reaches a terminal state.
pub type Notifier = Arc<dyn Fn(&BackgroundJob) + Send + Sync>;

/// Registry of detached jobs for one orchestrator.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Shared,
    settings: JobSettings,
    notifier: Option<Notifier>,
}

impl JobRegistry {
    pub fn new(settings: JobSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            settings,
            notifier: None,
        }
    }

    /// Install a completion notifier.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Register a new running job and return its id along with the
    /// token that cancels it.
    pub fn create(
        &self,
        agent: impl Into<String>,
        task: impl Into<String>,
        shape: RequestShape,
    ) -> (String, CancellationToken) {
        self.sweep();
        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let job = BackgroundJob {
            id: id.clone(),
            status: JobStatus::Running,
            agent: agent.into(),
            task: task.into(),
            shape,
            started_at: Utc::now(),
            finished_at: None,
            snapshot: None,
            result: None,
            error: None,
            cancel: cancel.clone(),
        };
        debug!(job_id = %id, %shape, "registered background job");
        self.write().insert(id.clone(), job);
        (id, cancel)
    }

    /// Drive a job's work on a detached task, recording the outcome.
    /// A panic in the work marks the job failed rather than leaving it
    /// running forever.
    pub fn spawn<F>(&self, id: String, work: F)
    where
        F: Future<Output = crate::error::Result<DelegationOutcome>> + Send + 'static,
    {
        let registry = self.clone();
        tokio::spawn(async move {
            let handle = tokio::spawn(work);
            match handle.await {
                Ok(Ok(outcome)) => {
                    registry.finish(&id, JobStatus::Completed, Some(outcome), None);
                }
                Ok(Err(err)) => {
                    registry.finish(&id, JobStatus::Failed, None, Some(err.to_string()));
                }
                Err(join_err) => {
                    error!(job_id = %id, %join_err, "background job panicked");
                    registry.finish(
                        &id,
                        JobStatus::Failed,
                        None,
                        Some(format!("job task panicked: {join_err}")),
                    );
                }
            }
        });
    }

    /// Record the latest progress text for a running job.
    pub fn record_progress(&self, id: &str, text: String) {
        if let Some(job) = self.write().get_mut(id) {
            if job.status == JobStatus::Running {
                job.snapshot = Some(ProgressSnapshot {
                    text,
                    at: Utc::now(),
                });
            }
        }
    }

    /// Transition a job to a terminal state. A second transition is a
    /// no-op, so a cancellation racing a completion settles on
    /// whichever landed first.
    pub fn finish(
        &self,
        id: &str,
        status: JobStatus,
        result: Option<DelegationOutcome>,
        error: Option<String>,
    ) {
        let notify = {
            let mut map = self.write();
            match map.get_mut(id) {
                Some(job) if !job.status.is_terminal() => {
                    job.status = status;
                    job.finished_at = Some(Utc::now());
                    job.result = result;
                    job.error = error;
                    debug!(job_id = %id, ?status, "background job finished");
                    Some(job.clone())
                }
                Some(_) => None,
                None => {
                    warn!(job_id = %id, "finish for unknown job");
                    None
                }
            }
        };
        if let (Some(job), Some(notifier)) = (notify, &self.notifier) {
            notifier(&job);
        }
    }

    /// Look up one job.
    pub fn get(&self, id: &str) -> Option<BackgroundJob> {
        self.read().get(id).cloned()
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<BackgroundJob> {
        let map = self.read();
        let mut jobs: Vec<BackgroundJob> = map.values().cloned().collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    /// Cancel a running job. Returns false for unknown or finished
    /// jobs.
    pub fn cancel(&self, id: &str) -> bool {
        match self.read().get(id) {
            Some(job) if !job.status.is_terminal() => {
                job.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every running job, for shutdown.
    pub fn cancel_all(&self) {
        for job in self.read().values() {
            if !job.status.is_terminal() {
                job.cancel.cancel();
            }
        }
    }

    /// Remove finished jobs, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, job| !job.status.is_terminal());
        before - map.len()
    }

    /// Drop finished jobs past the retention age, then trim the oldest
    /// finished jobs down to the retention count.
    fn sweep(&self) {
        let mut map = self.write();
        let cutoff = Utc::now() - chrono::Duration::seconds(self.settings.max_age_secs as i64);
        map.retain(|_, job| {
            !job.status.is_terminal() || job.finished_at.map_or(true, |at| at > cutoff)
        });

        if map.len() > self.settings.max_count {
            let mut finished: Vec<(String, DateTime<Utc>)> = map
                .values()
                .filter(|j| j.status.is_terminal())
                .map(|j| (j.id.clone(), j.finished_at.unwrap_or(j.started_at)))
                .collect();
            finished.sort_by_key(|(_, at)| *at);
            let excess = map.len().saturating_sub(self.settings.max_count);
            for (id, _) in finished.into_iter().take(excess) {
                map.remove(&id);
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, BackgroundJob>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, BackgroundJob>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrate::types::InvocationResult;
    use crate::profile::{ProfileScope, WorkerProfile};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> JobRegistry {
        JobRegistry::new(JobSettings::default())
    }

    fn outcome() -> DelegationOutcome {
        DelegationOutcome::Single(InvocationResult::pending(
            &WorkerProfile::new("builder", ProfileScope::User),
            "task",
        ))
    }

    #[test]
    fn test_create_returns_running_job() {
        let registry = registry();
        let (id, _cancel) = registry.create("builder", "fix it", RequestShape::Single);
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_status_is_monotonic() {
        let registry = registry();
        let (id, _cancel) = registry.create("builder", "fix it", RequestShape::Single);
        registry.finish(&id, JobStatus::Completed, Some(outcome()), None);
        // A late cancellation must not overwrite the completion.
        registry.finish(&id, JobStatus::Failed, None, Some("cancelled".to_string()));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_notifier_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let registry = JobRegistry::new(JobSettings::default()).with_notifier(Arc::new(
            move |_job: &BackgroundJob| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));
        let (id, _cancel) = registry.create("builder", "fix it", RequestShape::Single);
        registry.finish(&id, JobStatus::Completed, Some(outcome()), None);
        registry.finish(&id, JobStatus::Failed, None, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_progress_ignored_after_finish() {
        let registry = registry();
        let (id, _cancel) = registry.create("builder", "fix it", RequestShape::Single);
        registry.record_progress(&id, "turn 1".to_string());
        registry.finish(&id, JobStatus::Completed, Some(outcome()), None);
        registry.record_progress(&id, "late".to_string());
        let job = registry.get(&id).unwrap();
        assert_eq!(job.snapshot.unwrap().text, "turn 1");
    }

    #[test]
    fn test_clear_keeps_running() {
        let registry = registry();
        let (done, _c1) = registry.create("a", "t", RequestShape::Single);
        let (_running, _c2) = registry.create("b", "t", RequestShape::Single);
        registry.finish(&done, JobStatus::Failed, None, Some("x".to_string()));
        assert_eq!(registry.clear(), 1);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_cancel_running_only() {
        let registry = registry();
        let (id, cancel) = registry.create("a", "t", RequestShape::Single);
        assert!(registry.cancel(&id));
        assert!(cancel.is_cancelled());
        registry.finish(&id, JobStatus::Failed, None, None);
        assert!(!registry.cancel(&id));
        assert!(!registry.cancel("unknown"));
    }

    #[test]
    fn test_sweep_by_count() {
        let registry = JobRegistry::new(JobSettings {
            max_age_secs: 3600,
            max_count: 2,
        });
        let mut ids = Vec::new();
        for i in 0..4 {
            let (id, _cancel) = registry.create("a", format!("t{i}"), RequestShape::Single);
            registry.finish(&id, JobStatus::Completed, Some(outcome()), None);
            ids.push(id);
        }
        // Creation sweeps first, so earlier finished jobs get trimmed.
        assert!(registry.list().len() <= 3);
        assert!(registry.get(&ids[3]).is_some());
    }

    #[tokio::test]
    async fn test_spawn_records_outcome() {
        let registry = registry();
        let (id, _cancel) = registry.create("builder", "fix it", RequestShape::Single);
        registry.spawn(id.clone(), async { Ok(outcome()) });

        for _ in 0..50 {
            if registry.get(&id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn test_spawn_records_error() {
        let registry = registry();
        let (id, _cancel) = registry.create("builder", "fix it", RequestShape::Single);
        registry.spawn(id.clone(), async {
            Err(anyhow::anyhow!("worker blew up"))
        });

        for _ in 0..50 {
            if registry.get(&id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("worker blew up"));
    }
}
