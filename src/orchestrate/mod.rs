// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task delegation: drives worker agent processes, schedules
//! concurrent work, and tracks background jobs.

mod driver;
mod events;
mod jobs;
mod orchestrator;
mod scheduler;
mod types;

pub use driver::{SessionBinding, WorkerDriver};
pub use events::{fold_event, parse_line, WorkerEvent};
pub use jobs::{BackgroundJob, JobRegistry, JobStatus, Notifier, ProgressSnapshot};
pub use orchestrator::{ApprovalFn, ExecutionContext, Orchestrator};
pub use scheduler::{Scheduler, WorkUnit, PREVIOUS_PLACEHOLDER};
pub use types::{
    ChainFailure, ChainOutcome, ChainStep, DelegationOutcome, InvocationResult, ParallelItem,
    ParallelOutcome, ParallelProgress, ProgressEvent, ProgressFn, RawRequest, RequestShape,
    SingleSpec, WorkRequest, MAX_PARALLEL_ITEMS, PARALLEL_WORKERS,
};
