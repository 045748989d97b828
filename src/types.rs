// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions shared across the orchestrator.
//!
//! These are the vocabulary types for worker transcripts and usage
//! accounting. Everything here is plain data: serializable, cloneable,
//! and owned by whichever invocation is currently being built.

use serde::{Deserialize, Serialize};

/// Role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One segment of a transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text produced by the worker.
    Text { text: String },
    /// A tool invocation requested by the worker.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Output of one tool execution.
    ToolResult { tool: String, output: String },
}

impl Segment {
    /// Create a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A message emitted by a worker during one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub segments: Vec<Segment>,
}

impl TranscriptMessage {
    /// Create an assistant message with a single text segment.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            segments: vec![Segment::text(text)],
        }
    }

    /// Concatenate all text segments of this message.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Per-message usage counters as reported on the wire.
///
/// All fields default to zero so partial usage blocks decode cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageDelta {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub context_tokens: u64,
}

/// Accumulated usage for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
    /// Context size is a level, not a sum: the latest reported value wins.
    pub context_tokens: u64,
    /// Completed assistant turns.
    pub turns: u32,
}

impl UsageTotals {
    /// Fold one per-message delta into the running totals.
    pub fn accrue(&mut self, delta: &UsageDelta) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.cache_read_tokens += delta.cache_read_tokens;
        self.cache_write_tokens += delta.cache_write_tokens;
        self.cost_usd += delta.cost_usd;
        if delta.context_tokens > 0 {
            self.context_tokens = delta.context_tokens;
        }
    }

    /// Total input + output tokens.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Reasoning-effort hint forwarded to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    /// The lowercase wire form passed on the child command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Ok,
    Error,
    Aborted,
}

impl RunState {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_skips_tool_segments() {
        let msg = TranscriptMessage {
            role: Role::Assistant,
            segments: vec![
                Segment::text("hello "),
                Segment::ToolUse {
                    id: "t1".to_string(),
                    name: "grep".to_string(),
                    input: serde_json::json!({"pattern": "x"}),
                },
                Segment::text("world"),
            ],
        };
        assert_eq!(msg.plain_text(), "hello world");
    }

    #[test]
    fn test_usage_accrual() {
        let mut totals = UsageTotals::default();
        totals.accrue(&UsageDelta {
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.01,
            context_tokens: 2000,
            ..Default::default()
        });
        totals.accrue(&UsageDelta {
            input_tokens: 20,
            output_tokens: 30,
            cost_usd: 0.005,
            context_tokens: 2200,
            ..Default::default()
        });

        assert_eq!(totals.input_tokens, 120);
        assert_eq!(totals.output_tokens, 80);
        assert_eq!(totals.total_tokens(), 200);
        // Context is the latest level, not a sum.
        assert_eq!(totals.context_tokens, 2200);
        assert!((totals.cost_usd - 0.015).abs() < 1e-9);
    }

    #[test]
    fn test_usage_zero_context_does_not_reset() {
        let mut totals = UsageTotals::default();
        totals.accrue(&UsageDelta {
            context_tokens: 500,
            ..Default::default()
        });
        totals.accrue(&UsageDelta::default());
        assert_eq!(totals.context_tokens, 500);
    }

    #[test]
    fn test_segment_serialization() {
        let seg = Segment::text("hi");
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"type\":\"text\""));

        let parsed: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, seg);
    }

    #[test]
    fn test_effort_wire_form() {
        assert_eq!(ReasoningEffort::Low.as_str(), "low");
        assert_eq!(ReasoningEffort::High.as_str(), "high");
        let json = serde_json::to_string(&ReasoningEffort::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }

    #[test]
    fn test_run_state() {
        assert!(RunState::Ok.is_ok());
        assert!(!RunState::Error.is_ok());
        assert!(!RunState::Aborted.is_ok());
    }
}
