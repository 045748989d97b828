// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Worker event stream parsing.
//!
//! Workers write newline-delimited JSON on stdout. Each line is one
//! event; lines that are empty, malformed, or of an unknown type are
//! dropped so a chatty worker cannot corrupt a run.

use serde::Deserialize;
use tracing::debug;

use crate::types::{Role, Segment, TranscriptMessage, UsageDelta};

use super::types::InvocationResult;

/// One event from a worker's stdout stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// A transcript message from the worker.
    Message {
        role: Role,
        #[serde(default)]
        segments: Vec<Segment>,
        #[serde(default)]
        usage: Option<UsageDelta>,
        #[serde(default)]
        model: Option<String>,
    },
    /// Output of a completed tool invocation.
    ToolResult {
        tool: String,
        #[serde(default)]
        output: String,
    },
}

/// Parse one stdout line into an event, or `None` for anything that
/// is not a well-formed known event.
pub fn parse_line(line: &str) -> Option<WorkerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(%err, "dropping malformed worker line");
            None
        }
    }
}

/// Fold one event into an in-progress result.
///
/// Returns `true` when the event finished an assistant turn.
pub fn fold_event(result: &mut InvocationResult, event: WorkerEvent) -> bool {
    match event {
        WorkerEvent::Message {
            role,
            segments,
            usage,
            model,
        } => {
            let is_turn = role == Role::Assistant;
            if is_turn {
                result.usage.turns += 1;
                if let Some(delta) = &usage {
                    result.usage.accrue(delta);
                }
                if let Some(model) = model {
                    result.model = Some(model);
                }
            }
            result.messages.push(TranscriptMessage { role, segments });
            is_turn
        }
        WorkerEvent::ToolResult { tool, output } => {
            result.messages.push(TranscriptMessage {
                role: Role::Tool,
                segments: vec![Segment::ToolResult { tool, output }],
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileScope, WorkerProfile};

    fn pending() -> InvocationResult {
        InvocationResult::pending(&WorkerProfile::new("builder", ProfileScope::User), "task")
    }

    #[test]
    fn test_parse_message() {
        let line = r#"{"type":"message","role":"assistant","segments":[{"type":"text","text":"hello"}],"usage":{"input_tokens":10,"output_tokens":5},"model":"sonnet-4"}"#;
        let event = parse_line(line).unwrap();
        assert!(matches!(event, WorkerEvent::Message { .. }));
    }

    #[test]
    fn test_parse_tool_result() {
        let line = r#"{"type":"tool_result","tool":"grep","output":"3 matches"}"#;
        let event = parse_line(line).unwrap();
        assert!(matches!(event, WorkerEvent::ToolResult { .. }));
    }

    #[test]
    fn test_garbage_lines_dropped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json at all").is_none());
        assert!(parse_line(r#"{"type":"unknown_event","data":1}"#).is_none());
        assert!(parse_line(r#"{"role":"assistant"}"#).is_none());
    }

    #[test]
    fn test_fold_accrues_assistant_usage() {
        let mut result = pending();
        let event = parse_line(
            r#"{"type":"message","role":"assistant","segments":[{"type":"text","text":"a"}],"usage":{"input_tokens":100,"output_tokens":20,"cost_usd":0.01}}"#,
        )
        .unwrap();
        assert!(fold_event(&mut result, event));
        assert_eq!(result.usage.input_tokens, 100);
        assert_eq!(result.usage.output_tokens, 20);
        assert_eq!(result.usage.turns, 1);
        assert_eq!(result.turns(), 1);
    }

    #[test]
    fn test_turns_counted_in_usage() {
        // Turns are part of the serialized usage totals, counted even
        // when a message carries no usage block.
        let mut result = pending();
        for line in [
            r#"{"type":"message","role":"assistant","segments":[{"type":"text","text":"a"}]}"#,
            r#"{"type":"message","role":"user","segments":[]}"#,
            r#"{"type":"message","role":"assistant","segments":[{"type":"text","text":"b"}]}"#,
        ] {
            fold_event(&mut result, parse_line(line).unwrap());
        }
        assert_eq!(result.usage.turns, 2);
        let json = serde_json::to_string(&result.usage).unwrap();
        assert!(json.contains("\"turns\":2"));
    }

    #[test]
    fn test_fold_ignores_user_usage() {
        let mut result = pending();
        let event = parse_line(
            r#"{"type":"message","role":"user","segments":[],"usage":{"input_tokens":50}}"#,
        )
        .unwrap();
        assert!(!fold_event(&mut result, event));
        assert_eq!(result.usage.input_tokens, 0);
        assert_eq!(result.usage.turns, 0);
        assert_eq!(result.turns(), 0);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn test_fold_model_override() {
        let mut result = pending();
        result.model = Some("profile-model".to_string());
        let event = parse_line(
            r#"{"type":"message","role":"assistant","segments":[],"model":"actual-model"}"#,
        )
        .unwrap();
        fold_event(&mut result, event);
        assert_eq!(result.model.as_deref(), Some("actual-model"));
    }

    #[test]
    fn test_tool_result_becomes_tool_message() {
        let mut result = pending();
        let event = parse_line(r#"{"type":"tool_result","tool":"run_tests","output":"ok"}"#).unwrap();
        fold_event(&mut result, event);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::Tool);
    }
}
