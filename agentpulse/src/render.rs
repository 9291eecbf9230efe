//! Terminal formatting for event frames
//!
//! One human-readable line per frame, plus the end-of-session summary.
//! Formatting is lossy on purpose: the full payloads stay available via
//! `--json` output.

use agentpulse_core::consumer::StreamConsumer;
use agentpulse_core::protocol::{ActivityEvent, EventFrame};
use agentpulse_core::types::{truncate_chars, ToolStatus};

/// Render one frame as a display line, or `None` for frames that should stay
/// silent (partial deltas would flood the terminal; unknown kinds are skipped).
pub fn format_frame(frame: &EventFrame) -> Option<String> {
    let time = frame.timestamp.format("%H:%M:%S");
    let line = match &frame.event {
        ActivityEvent::Connection => {
            format!("[{}] Connected to session {}", time, frame.session_id)
        }
        ActivityEvent::Status { message, .. } => format!("[{}] {}", time, message),
        ActivityEvent::Partial { .. } => return None,
        ActivityEvent::Message { message } => {
            let text = message.text.as_deref().unwrap_or("(no text)");
            format!("[{}] [{}] {}", time, message.role, text)
        }
        ActivityEvent::ToolStart {
            tool_name,
            tool_input,
            ..
        } => format!("[{}] -> {} {}", time, tool_name, compact_input(tool_input)),
        ActivityEvent::QuestionRequest {
            question_request, ..
        } => {
            let question = question_request
                .get("question")
                .and_then(|q| q.as_str())
                .unwrap_or("(question)");
            format!("[{}] ?? Agent asks: {}", time, question)
        }
        ActivityEvent::ToolResult {
            tool_name,
            success,
            duration,
            output_preview,
            ..
        } => {
            let mark = if *success { "ok" } else { "FAILED" };
            let preview = output_preview.lines().next().unwrap_or("");
            format!(
                "[{}] <- {} {} ({}ms) {}",
                time, tool_name, mark, duration, preview
            )
        }
        ActivityEvent::SubagentStart { subagent_info, .. } => {
            let purpose = subagent_info.description.as_deref().unwrap_or("");
            format!(
                "[{}] >> Sub-agent {} started {}",
                time, subagent_info.agent_type, purpose
            )
        }
        ActivityEvent::SubagentStop {
            subagent_name,
            success,
            duration,
            ..
        } => {
            let mark = if *success { "ok" } else { "FAILED" };
            format!(
                "[{}] << Sub-agent {} finished {} ({}ms)",
                time, subagent_name, mark, duration
            )
        }
        ActivityEvent::Checkpoint { checkpoint } => {
            format!("[{}] * Checkpoint: {}", time, checkpoint.preview)
        }
        ActivityEvent::Progress { data } => format!(
            "[{}] Phase: {} ({} tool calls)",
            time,
            data.phase.display_name(),
            data.completed_tools
        ),
        ActivityEvent::Result { success, error, .. } => {
            if *success {
                format!("[{}] Session result: success", time)
            } else {
                format!(
                    "[{}] Session result: failed ({})",
                    time,
                    error.as_deref().unwrap_or("unknown error")
                )
            }
        }
        ActivityEvent::Complete { message_count } => {
            format!("[{}] Session complete ({} messages)", time, message_count)
        }
        ActivityEvent::Error { error } => format!("[{}] Session error: {}", time, error),
        ActivityEvent::Unknown => return None,
    };
    Some(line)
}

/// Print the end-of-session summary from the final consumer state.
pub fn print_summary(consumer: &StreamConsumer) {
    let failed = consumer
        .tool_activities
        .iter()
        .filter(|a| a.status == ToolStatus::Failed)
        .count();
    let delegations = consumer
        .tool_activities
        .iter()
        .filter(|a| a.subagent_name.is_some())
        .count();

    println!("\nSession summary:");
    if let Some(count) = consumer.message_count {
        println!("  Messages:    {}", count);
    }
    println!(
        "  Tool calls:  {} ({} failed)",
        consumer.tool_activities.len(),
        failed
    );
    if delegations > 0 {
        println!("  Sub-agents:  {}", delegations);
    }
    println!("  Checkpoints: {}", consumer.checkpoints.len());
    if let Some(progress) = &consumer.progress {
        println!("  Final phase: {}", progress.phase.display_name());
    }
    if let Some(usage) = &consumer.usage {
        println!(
            "  Tokens:      {} in / {} out",
            usage.input_tokens, usage.output_tokens
        );
    }
    if let Some(error) = &consumer.error {
        println!("  Error:       {}", error);
    }
}

/// Compact single-line rendering of a tool input payload.
fn compact_input(input: &serde_json::Value) -> String {
    match input {
        serde_json::Value::Object(map) if !map.is_empty() => {
            let fields: Vec<String> = map
                .iter()
                .take(3)
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) if s.chars().count() <= 60 => {
                        format!("{}={}", k, s)
                    }
                    serde_json::Value::String(s) => format!("{}={}...", k, truncate_chars(s, 57)),
                    other => format!("{}={}", k, other),
                })
                .collect();
            fields.join(" ")
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frames_stay_silent() {
        let frame = EventFrame::new(
            "s",
            ActivityEvent::Partial {
                delta: "chunk".to_string(),
            },
        );
        assert!(format_frame(&frame).is_none());
    }

    #[test]
    fn test_tool_result_line() {
        let frame = EventFrame::new(
            "s",
            ActivityEvent::ToolResult {
                tool_call_id: "t1".to_string(),
                tool_name: "Glob".to_string(),
                success: true,
                duration: 42,
                output_preview: "src/main.rs\nsrc/lib.rs".to_string(),
            },
        );
        let line = format_frame(&frame).unwrap();
        assert!(line.contains("<- Glob ok (42ms) src/main.rs"));
        // Only the first preview line is shown
        assert!(!line.contains("lib.rs"));
    }

    #[test]
    fn test_compact_input() {
        assert_eq!(
            compact_input(&serde_json::json!({"pattern": "**/*.rs"})),
            "pattern=**/*.rs"
        );
        assert_eq!(compact_input(&serde_json::json!({})), "");
        assert_eq!(compact_input(&serde_json::json!("raw")), "");
    }
}
