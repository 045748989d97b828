// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Terminal rendering of outcomes and jobs.

use colored::Colorize;

use crate::orchestrate::{
    BackgroundJob, ChainOutcome, DelegationOutcome, InvocationResult, JobStatus, ParallelOutcome,
};

/// Renders outcomes for a human reader.
pub trait Presenter {
    fn render_outcome(&self, outcome: &DelegationOutcome) -> String;
    fn render_job(&self, job: &BackgroundJob) -> String;
    fn render_job_list(&self, jobs: &[BackgroundJob]) -> String;
}

/// Plain-text presenter with optional ANSI color.
pub struct TextPresenter {
    color: bool,
}

impl TextPresenter {
    pub fn new(color: bool) -> Self {
        // Global switch so nested Colorize calls honor the choice.
        if !color {
            colored::control::set_override(false);
        }
        Self { color }
    }

    pub fn color(&self) -> bool {
        self.color
    }

    fn render_result(&self, result: &InvocationResult, out: &mut String) {
        let header = if result.is_success() {
            format!("✓ {}", result.agent).green().bold()
        } else {
            format!("✗ {}", result.agent).red().bold()
        };
        out.push_str(&header.to_string());
        if let Some(model) = &result.model {
            out.push_str(&format!(" {}", format!("[{model}]").dimmed()));
        }
        if let Some(session) = &result.session_id {
            out.push_str(&format!(" {}", format!("(session {session})").dimmed()));
        }
        out.push('\n');

        if let Some(text) = result.final_text() {
            out.push_str(&text);
            out.push('\n');
        }
        if let Some(error) = &result.error {
            out.push_str(&format!("{}\n", error.red()));
        }
        let usage = &result.usage;
        if usage.total_tokens() > 0 {
            out.push_str(
                &format!(
                    "{} turns, {} tokens in, {} tokens out, ${:.4}\n",
                    result.turns(),
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cost_usd
                )
                .dimmed()
                .to_string(),
            );
        }
    }

    fn render_parallel(&self, outcome: &ParallelOutcome, out: &mut String) {
        out.push_str(&format!(
            "{}\n",
            format!(
                "parallel: {}/{} succeeded",
                outcome.succeeded,
                outcome.results.len()
            )
            .bold()
        ));
        for (index, result) in outcome.results.iter().enumerate() {
            out.push_str(&format!("{}\n", format!("--- item {}", index + 1).dimmed()));
            self.render_result(result, out);
        }
    }

    fn render_chain(&self, outcome: &ChainOutcome, out: &mut String) {
        for (index, result) in outcome.steps.iter().enumerate() {
            out.push_str(&format!("{}\n", format!("--- step {}", index + 1).dimmed()));
            self.render_result(result, out);
        }
        if let Some(failure) = &outcome.failure {
            out.push_str(&format!(
                "{}\n",
                format!(
                    "chain stopped at step {} ({}): {}",
                    failure.step_index + 1,
                    failure.agent,
                    failure.reason
                )
                .red()
                .bold()
            ));
        }
    }
}

impl Presenter for TextPresenter {
    fn render_outcome(&self, outcome: &DelegationOutcome) -> String {
        let mut out = String::new();
        match outcome {
            DelegationOutcome::Single(result) => self.render_result(result, &mut out),
            DelegationOutcome::Parallel(parallel) => self.render_parallel(parallel, &mut out),
            DelegationOutcome::Chain(chain) => self.render_chain(chain, &mut out),
        }
        out
    }

    fn render_job(&self, job: &BackgroundJob) -> String {
        let mut out = String::new();
        let status = match job.status {
            JobStatus::Running => "running".yellow(),
            JobStatus::Completed => "completed".green(),
            JobStatus::Failed => "failed".red(),
        };
        out.push_str(&format!(
            "{} {} {} {}\n",
            job.id.bold(),
            status,
            job.shape,
            job.agent
        ));
        out.push_str(&format!("  task: {}\n", job.task));
        if let Some(snapshot) = &job.snapshot {
            out.push_str(&format!("  last: {}\n", snapshot.text.dimmed()));
        }
        if let Some(result) = &job.result {
            out.push_str(&format!("  {}\n", result.summary()));
        }
        if let Some(error) = &job.error {
            out.push_str(&format!("  {}\n", error.red()));
        }
        out
    }

    fn render_job_list(&self, jobs: &[BackgroundJob]) -> String {
        if jobs.is_empty() {
            return "no background jobs\n".dimmed().to_string();
        }
        let mut out = String::new();
        for job in jobs {
            out.push_str(&self.render_job(job));
        }
        out
    }
}
