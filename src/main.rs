// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Foreman main entry point - CLI commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use foreman::config::{load_config, OrchestratorConfig};
use foreman::orchestrate::{
    ChainStep, ExecutionContext, JobStatus, Orchestrator, ParallelItem, WorkRequest,
};
use foreman::present::{Presenter, TextPresenter};
use foreman::profile::{ScopeQuery, StaticResolver};
use foreman::telemetry::{init_telemetry, TelemetryConfig};

/// Foreman - delegate tasks to isolated AI worker agents.
#[derive(Parser)]
#[command(name = "foreman")]
#[command(author, version, about = "Delegate tasks to isolated AI worker agents", long_about = None)]
struct Cli {
    /// Working directory handed to workers
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    /// Profile scopes to consult
    #[arg(long, value_enum, default_value = "both", global = true)]
    scope: Scope,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scope {
    User,
    Project,
    Both,
}

impl From<Scope> for ScopeQuery {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::User => ScopeQuery::UserOnly,
            Scope::Project => ScopeQuery::ProjectOnly,
            Scope::Both => ScopeQuery::ProjectOverridesUser,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent on one task
    Run {
        /// Profile name
        agent: String,
        /// Task text
        task: String,
        /// Resume an existing session
        #[arg(short, long)]
        resume: Option<String>,
        /// Run detached as a background job
        #[arg(short, long)]
        background: bool,
    },
    /// Run independent AGENT=TASK items concurrently
    Parallel {
        /// Items as AGENT=TASK pairs
        #[arg(required = true)]
        items: Vec<String>,
        /// Run detached as a background job
        #[arg(short, long)]
        background: bool,
    },
    /// Run dependent AGENT=TASK steps in order; {previous} in a task
    /// is replaced with the prior step's answer
    Chain {
        /// Steps as AGENT=TASK pairs
        #[arg(required = true)]
        steps: Vec<String>,
        /// Run detached as a background job
        #[arg(short, long)]
        background: bool,
    },
    /// Inspect background jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Inspect resumable sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand)]
enum JobsCommand {
    /// List jobs, newest first
    #[command(alias = "ls")]
    List,
    /// Show one job
    Get { id: String },
    /// Cancel a running job
    Cancel { id: String },
    /// Remove finished jobs
    Clear,
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List sessions, most recently used first
    #[command(alias = "ls")]
    List,
    /// Remove one session
    Evict { id: String },
    /// Remove all idle sessions
    Clear,
}

fn parse_pairs(raw: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(agent, task)| (agent.to_string(), task.to_string()))
                .ok_or_else(|| anyhow::anyhow!("expected AGENT=TASK, got: {pair}"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = if cli.debug {
        TelemetryConfig::development()
    } else {
        TelemetryConfig::default().with_level(Level::WARN)
    };
    let _guard = init_telemetry(&telemetry.with_ansi(!cli.no_color))?;

    let cwd = match cli.dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config: OrchestratorConfig = load_config(&cwd)?;
    let resolver = Arc::new(StaticResolver::from_profiles(config.profiles.clone()));
    let orchestrator = Arc::new(Orchestrator::new(config, resolver)?);
    let presenter = TextPresenter::new(!cli.no_color);
    let scope: ScopeQuery = cli.scope.into();

    match cli.command {
        Command::Run {
            agent,
            task,
            resume,
            background,
        } => {
            let request = WorkRequest::Single { agent, task, resume };
            dispatch(orchestrator, request, background, cwd, scope, &presenter).await
        }
        Command::Parallel { items, background } => {
            let items = parse_pairs(&items)?
                .into_iter()
                .map(|(agent, task)| ParallelItem { agent, task })
                .collect();
            let request = WorkRequest::Parallel { items };
            dispatch(orchestrator, request, background, cwd, scope, &presenter).await
        }
        Command::Chain { steps, background } => {
            let steps = parse_pairs(&steps)?
                .into_iter()
                .map(|(agent, task)| ChainStep { agent, task })
                .collect();
            let request = WorkRequest::Chain { steps };
            dispatch(orchestrator, request, background, cwd, scope, &presenter).await
        }
        Command::Jobs { command } => {
            match command {
                JobsCommand::List => print!("{}", presenter.render_job_list(&orchestrator.jobs().list())),
                JobsCommand::Get { id } => match orchestrator.jobs().get(&id) {
                    Some(job) => print!("{}", presenter.render_job(&job)),
                    None => anyhow::bail!("no such job: {id}"),
                },
                JobsCommand::Cancel { id } => {
                    if !orchestrator.jobs().cancel(&id) {
                        anyhow::bail!("job is not running: {id}");
                    }
                    println!("cancelled {id}");
                }
                JobsCommand::Clear => {
                    let removed = orchestrator.jobs().clear();
                    println!("removed {removed} finished jobs");
                }
            }
            Ok(())
        }
        Command::Sessions { command } => {
            match command {
                SessionsCommand::List => {
                    let sessions = orchestrator.sessions().list();
                    if sessions.is_empty() {
                        println!("{}", "no sessions".dimmed());
                    }
                    for session in sessions {
                        println!(
                            "{} {} last used {}{}",
                            session.id.bold(),
                            session.agent,
                            session.last_used.format("%Y-%m-%d %H:%M:%S"),
                            if session.in_use { " (in use)" } else { "" }
                        );
                    }
                }
                SessionsCommand::Evict { id } => {
                    if !orchestrator.sessions().evict(&id) {
                        anyhow::bail!("session not found or in use: {id}");
                    }
                    println!("evicted {id}");
                }
                SessionsCommand::Clear => {
                    let removed = orchestrator.sessions().clear();
                    println!("removed {removed} sessions");
                }
            }
            Ok(())
        }
    }
}

/// Run a request in the foreground, or submit it as a job and follow
/// its progress until it finishes.
async fn dispatch(
    orchestrator: Arc<Orchestrator>,
    request: WorkRequest,
    background: bool,
    cwd: PathBuf,
    scope: ScopeQuery,
    presenter: &TextPresenter,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, stopping workers...");
            ctrl_c.cancel();
        }
    });

    if background {
        let id = orchestrator.submit_background(request, cwd, scope)?;
        println!("job {id}");
        return follow_job(orchestrator, &id, cancel, presenter).await;
    }

    let ctx = ExecutionContext::new(cwd)
        .with_scope(scope)
        .with_cancel(cancel);
    match orchestrator.execute(request, ctx).await {
        Ok(outcome) => {
            print!("{}", presenter.render_outcome(&outcome));
            Ok(())
        }
        Err(err) if err.is_aborted() => {
            eprintln!("{}", "aborted".red());
            std::process::exit(130);
        }
        Err(err) => Err(err.into()),
    }
}

/// Poll a submitted job, echoing progress snapshots, until it reaches
/// a terminal state. Ctrl-C cancels the job rather than abandoning it.
async fn follow_job(
    orchestrator: Arc<Orchestrator>,
    id: &str,
    cancel: CancellationToken,
    presenter: &TextPresenter,
) -> anyhow::Result<()> {
    let mut last_snapshot = String::new();
    loop {
        if cancel.is_cancelled() {
            orchestrator.jobs().cancel(id);
        }
        let Some(job) = orchestrator.jobs().get(id) else {
            anyhow::bail!("job disappeared: {id}");
        };
        if job.status.is_terminal() {
            print!("{}", presenter.render_job(&job));
            if job.status == JobStatus::Failed {
                std::process::exit(1);
            }
            return Ok(());
        }
        if let Some(snapshot) = &job.snapshot {
            if snapshot.text != last_snapshot {
                eprintln!("{}", snapshot.text.dimmed());
                last_snapshot = snapshot.text.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
