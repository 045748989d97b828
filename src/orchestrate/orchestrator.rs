// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The orchestrator: validates requests, resolves profiles, binds
//! sessions, and dispatches to the scheduler.
//!
//! Precondition failures that apply to one unit of work, an unknown
//! profile or an unavailable session, become failed results inside a
//! successful outcome. Only malformed requests and cancellation
//! surface as errors.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::OrchestratorConfig;
use crate::error::{DriverError, OrchestratorError, SessionError};
use crate::profile::{ProfileResolver, ProfileScope, ScopeQuery, WorkerProfile};
use crate::session::SessionStore;

use super::driver::{SessionBinding, WorkerDriver};
use super::jobs::JobRegistry;
use super::scheduler::{Scheduler, WorkUnit};
use super::types::{
    DelegationOutcome, InvocationResult, ProgressFn, WorkRequest,
};

/// Decides whether a project-scoped profile may run. Returning false
/// turns the invocation into a precondition failure without a spawn.
pub type ApprovalFn = Arc<dyn Fn(&WorkerProfile) -> bool + Send + Sync>;

/// Per-request execution parameters.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Working directory handed to worker processes.
    pub cwd: PathBuf,
    /// Profile scopes consulted during resolution.
    pub scope: ScopeQuery,
    /// Confirmation hook for project-scoped profiles. `None` allows
    /// them unconditionally.
    pub approval: Option<ApprovalFn>,
    /// Cancels every worker belonging to this request.
    pub cancel: CancellationToken,
    /// Progress callback, invoked after every accepted worker event.
    pub progress: Option<ProgressFn>,
}

impl ExecutionContext {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            scope: ScopeQuery::default(),
            approval: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_scope(mut self, scope: ScopeQuery) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_approval(mut self, approval: ApprovalFn) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Coordinates delegated work across profiles, sessions, and workers.
pub struct Orchestrator {
    resolver: Arc<dyn ProfileResolver>,
    driver: Arc<WorkerDriver>,
    scheduler: Scheduler,
    sessions: SessionStore,
    jobs: JobRegistry,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        resolver: Arc<dyn ProfileResolver>,
    ) -> Result<Self, SessionError> {
        let driver = Arc::new(WorkerDriver::new(config.worker.clone()));
        let scheduler = Scheduler::new(Arc::clone(&driver), config.limits.clone());
        let sessions = SessionStore::open(&config.sessions)?;
        let jobs = JobRegistry::new(config.jobs.clone());
        Ok(Self {
            resolver,
            driver,
            scheduler,
            sessions,
            jobs,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Execute a request to completion.
    pub async fn execute(
        &self,
        request: WorkRequest,
        ctx: ExecutionContext,
    ) -> Result<DelegationOutcome, OrchestratorError> {
        request.validate(self.config.limits.max_parallel_items)?;
        debug!(shape = %request.shape(), "executing request");

        match request {
            WorkRequest::Single { agent, task, resume } => {
                let result = self.run_single(&agent, &task, resume, &ctx).await?;
                Ok(DelegationOutcome::Single(result))
            }
            WorkRequest::Parallel { items } => {
                let mut units = Vec::with_capacity(items.len());
                for item in items {
                    let profile = self.resolve_checked(&item.agent, &ctx).await;
                    units.push(WorkUnit {
                        agent: item.agent,
                        task: item.task,
                        profile,
                    });
                }
                let outcome = self
                    .scheduler
                    .run_parallel(units, &ctx.cwd, ctx.cancel, ctx.progress)
                    .await?;
                info!(
                    succeeded = outcome.succeeded,
                    total = outcome.results.len(),
                    "parallel request finished"
                );
                Ok(DelegationOutcome::Parallel(outcome))
            }
            WorkRequest::Chain { steps } => {
                let mut units = Vec::with_capacity(steps.len());
                for step in steps {
                    let profile = self.resolve_checked(&step.agent, &ctx).await;
                    units.push(WorkUnit {
                        agent: step.agent,
                        task: step.task,
                        profile,
                    });
                }
                let outcome = self
                    .scheduler
                    .run_chain(units, &ctx.cwd, ctx.cancel, ctx.progress)
                    .await?;
                Ok(DelegationOutcome::Chain(outcome))
            }
        }
    }

    /// Resolve a profile and check the project-approval policy,
    /// producing the precondition message on failure.
    async fn resolve_checked(
        &self,
        agent: &str,
        ctx: &ExecutionContext,
    ) -> Result<Arc<WorkerProfile>, String> {
        let profile = self
            .resolver
            .resolve(agent, ctx.scope)
            .await
            .ok_or_else(|| format!("unknown agent profile: {agent}"))?;
        if profile.scope == ProfileScope::Project {
            if let Some(approval) = &ctx.approval {
                if !approval(&profile) {
                    return Err(format!(
                        "project profile '{agent}' was not approved to run"
                    ));
                }
            }
        }
        Ok(profile)
    }

    async fn run_single(
        &self,
        agent: &str,
        task: &str,
        resume: Option<String>,
        ctx: &ExecutionContext,
    ) -> Result<InvocationResult, OrchestratorError> {
        let profile = match self.resolve_checked(agent, ctx).await {
            Ok(profile) => profile,
            Err(reason) => {
                return Ok(InvocationResult::precondition_failure(
                    agent, None, task, reason,
                ))
            }
        };

        let binding = match resume {
            Some(id) => match self.sessions.acquire(&id, agent) {
                Ok(lease) => SessionBinding {
                    lease,
                    resumed: true,
                },
                Err(err) => {
                    return Ok(InvocationResult::precondition_failure(
                        agent,
                        Some(profile.scope),
                        task,
                        err.to_string(),
                    ))
                }
            },
            None => SessionBinding {
                lease: self
                    .sessions
                    .create(agent)
                    .map_err(OrchestratorError::from)?,
                resumed: false,
            },
        };

        match self
            .driver
            .run(
                profile.clone(),
                task,
                &ctx.cwd,
                Some(binding),
                ctx.cancel.clone(),
                ctx.progress.clone(),
            )
            .await
        {
            Ok(result) => Ok(result),
            Err(DriverError::Aborted) => Err(DriverError::Aborted.into()),
            Err(err) => Ok(InvocationResult::precondition_failure(
                agent,
                Some(profile.scope),
                task,
                err.to_string(),
            )),
        }
    }

    /// Submit a request as a detached background job, returning the
    /// job id immediately. Validation still happens up front so a
    /// malformed request never becomes a job.
    pub fn submit_background(
        self: &Arc<Self>,
        request: WorkRequest,
        cwd: PathBuf,
        scope: ScopeQuery,
    ) -> Result<String, OrchestratorError> {
        request.validate(self.config.limits.max_parallel_items)?;

        let (agent, task) = request.describe();
        let (id, cancel) = self.jobs.create(agent, task, request.shape());
        info!(job_id = %id, shape = %request.shape(), "submitted background job");

        let progress: ProgressFn = {
            let jobs = self.jobs.clone();
            let id = id.clone();
            Arc::new(move |event| {
                jobs.record_progress(&id, event.snapshot());
            })
        };

        let this = Arc::clone(self);
        let ctx = ExecutionContext {
            cwd,
            scope,
            approval: None,
            cancel,
            progress: Some(progress),
        };
        self.jobs.spawn(id.clone(), async move {
            this.execute(request, ctx).await.map_err(Into::into)
        });

        Ok(id)
    }

    /// Cancel all running jobs, for shutdown.
    pub fn shutdown(&self) {
        self.jobs.cancel_all();
    }
}
