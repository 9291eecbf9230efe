//! Message normalization
//!
//! Maps one raw agent-runtime message into zero or more canonical facts the
//! downstream pipeline stages consume. Normalization never raises: a malformed
//! message degrades to "no facts" with a local warning rather than aborting
//! the session.
//!
//! Partial text deltas are deliberately excluded from generic logging because
//! of their volume.

use serde::Deserialize;

use crate::subagent;
use crate::types::{truncate_chars, MessageEnvelope, SubagentInfo, UsageTotals};

/// Reserved tool name that asks the human operator a question.
const ASK_USER_TOOL: &str = "askuserquestion";

// ============================================
// Raw runtime message types (serde deserialization)
// ============================================

/// One decoded message from the agent runtime.
///
/// Uses `#[serde(default)]` liberally to handle missing fields gracefully;
/// message kinds introduced by future runtimes land in [`RuntimeMessage::Unknown`].
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    /// Character-level text delta while the model is streaming
    StreamEvent {
        #[serde(default)]
        delta: String,
    },
    /// A finalized assistant turn, possibly embedding tool invocations
    Assistant {
        #[serde(default)]
        message: RawTurn,
        #[serde(default)]
        uuid: Option<String>,
    },
    /// A human turn, or the runtime reporting tool outcomes
    User {
        #[serde(default)]
        message: RawTurn,
        #[serde(default)]
        uuid: Option<String>,
    },
    /// Terminal outcome of the whole session
    Result {
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        usage: Option<UsageTotals>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl RuntimeMessage {
    /// Decode one JSON line into a runtime message.
    ///
    /// Returns `None` (with a warning) for malformed input; the caller keeps
    /// going.
    pub fn from_json_line(line: &str) -> Option<Self> {
        match serde_json::from_str(line.trim()) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed runtime message");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RawTurn {
    pub role: Option<String>,
    pub model: Option<String>,
    pub content: RawContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for RawContent {
    fn default() -> Self {
        RawContent::Text(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    // Catch-all for unknown block types
    #[serde(other)]
    Unknown,
}

// ============================================
// Canonical facts
// ============================================

/// Preview source for a human turn, feeding checkpoint creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPreview {
    /// First text block of the turn
    Text(String),
    /// The turn only carried tool results; keep an id prefix for display
    ToolResult { id_prefix: String },
    /// Nothing displayable
    Empty,
}

/// A canonical fact extracted from one raw runtime message.
#[derive(Debug, Clone)]
pub enum Fact {
    /// Character-level text delta
    Partial { delta: String },
    /// Finalized assistant turn envelope
    Message { envelope: MessageEnvelope },
    /// A tool invocation started
    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The reserved ask-the-user tool was invoked
    QuestionRequest {
        id: String,
        request: serde_json::Value,
    },
    /// A delegating invocation spawned a named sub-agent
    SubagentStart { id: String, info: SubagentInfo },
    /// The runtime reported a tool outcome
    ToolResult {
        id: String,
        is_error: bool,
        output_preview: String,
    },
    /// A completed human turn (checkpoint trigger)
    HumanTurn {
        uuid: Option<String>,
        preview: TurnPreview,
    },
    /// Terminal session outcome
    Terminal {
        success: bool,
        usage: Option<UsageTotals>,
        error: Option<String>,
    },
}

/// Map one raw runtime message to zero or more facts.
///
/// `preview_chars` bounds the tool output previews carried downstream.
pub fn normalize(msg: &RuntimeMessage, preview_chars: usize) -> Vec<Fact> {
    match msg {
        RuntimeMessage::StreamEvent { delta } => {
            vec![Fact::Partial {
                delta: delta.clone(),
            }]
        }
        RuntimeMessage::Assistant { message, .. } => normalize_assistant(message, preview_chars),
        RuntimeMessage::User { message, uuid } => {
            normalize_user(message, uuid.as_deref(), preview_chars)
        }
        RuntimeMessage::Result {
            is_error,
            usage,
            error,
        } => {
            vec![Fact::Terminal {
                success: !is_error,
                usage: *usage,
                error: error.clone(),
            }]
        }
        RuntimeMessage::Unknown => {
            tracing::debug!("ignoring unrecognized runtime message kind");
            vec![]
        }
    }
}

/// An assistant turn yields a `message` fact always, plus one `tool_start`
/// per embedded invocation (with `question_request` / `subagent_start`
/// companions where the invocation qualifies).
fn normalize_assistant(turn: &RawTurn, preview_chars: usize) -> Vec<Fact> {
    let mut facts = Vec::new();
    let mut text = String::new();
    let mut tool_use_count = 0u32;

    let blocks = match &turn.content {
        RawContent::Text(t) => {
            text.push_str(t);
            &[][..]
        }
        RawContent::Blocks(blocks) => blocks.as_slice(),
    };

    // The envelope fact is emitted before the embedded tool starts, so it is
    // built in a first pass over the blocks.
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(t);
            }
            ContentBlock::ToolUse { .. } => tool_use_count += 1,
            ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
        }
    }

    facts.push(Fact::Message {
        envelope: MessageEnvelope {
            role: turn.role.clone().unwrap_or_else(|| "assistant".to_string()),
            model: turn.model.clone(),
            text: if text.is_empty() {
                None
            } else {
                Some(truncate_chars(&text, preview_chars).to_string())
            },
            tool_use_count,
        },
    });

    for block in blocks {
        if let ContentBlock::ToolUse { id, name, input } = block {
            facts.push(Fact::ToolStart {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            });

            if name.eq_ignore_ascii_case(ASK_USER_TOOL) {
                facts.push(Fact::QuestionRequest {
                    id: id.clone(),
                    request: input.clone(),
                });
            }

            if subagent::is_delegation(name, input) {
                facts.push(Fact::SubagentStart {
                    id: id.clone(),
                    info: SubagentInfo::from_invocation(name, input),
                });
            }
        }
    }

    facts
}

/// A user turn yields one `tool_result` fact per embedded result block, plus
/// a `human_turn` fact for checkpoint capture.
fn normalize_user(turn: &RawTurn, uuid: Option<&str>, preview_chars: usize) -> Vec<Fact> {
    let mut facts = Vec::new();
    let mut preview = TurnPreview::Empty;

    match &turn.content {
        RawContent::Text(text) => {
            if !text.is_empty() {
                preview = TurnPreview::Text(text.clone());
            }
        }
        RawContent::Blocks(blocks) => {
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => {
                        if preview == TurnPreview::Empty && !text.is_empty() {
                            preview = TurnPreview::Text(text.clone());
                        }
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => {
                        facts.push(Fact::ToolResult {
                            id: tool_use_id.clone(),
                            is_error: *is_error,
                            output_preview: result_preview(content, preview_chars),
                        });
                        if preview == TurnPreview::Empty {
                            preview = TurnPreview::ToolResult {
                                id_prefix: truncate_chars(tool_use_id, 8).to_string(),
                            };
                        }
                    }
                    ContentBlock::ToolUse { .. } | ContentBlock::Unknown => {}
                }
            }
        }
    }

    facts.push(Fact::HumanTurn {
        uuid: uuid.map(|u| u.to_string()),
        preview,
    });

    facts
}

/// Best-effort text preview of a tool result payload.
fn result_preview(content: &serde_json::Value, preview_chars: usize) -> String {
    let text = match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .find_map(|b| b.get("text").and_then(|t| t.as_str()))
            .map(|s| s.to_string())
            .unwrap_or_else(|| content.to_string()),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    truncate_chars(&text, preview_chars).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: serde_json::Value) -> RuntimeMessage {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_partial_yields_only_partial() {
        let msg = decode(serde_json::json!({"type": "stream_event", "delta": "hel"}));
        let facts = normalize(&msg, 200);
        assert_eq!(facts.len(), 1);
        assert!(matches!(&facts[0], Fact::Partial { delta } if delta == "hel"));
    }

    #[test]
    fn test_assistant_turn_with_tool_use() {
        let msg = decode(serde_json::json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "model": "opus",
                "content": [
                    {"type": "text", "text": "Let me look."},
                    {"type": "tool_use", "id": "toolu_1", "name": "Glob",
                     "input": {"pattern": "*"}},
                ],
            },
        }));
        let facts = normalize(&msg, 200);
        assert_eq!(facts.len(), 2);
        match &facts[0] {
            Fact::Message { envelope } => {
                assert_eq!(envelope.text.as_deref(), Some("Let me look."));
                assert_eq!(envelope.tool_use_count, 1);
                assert_eq!(envelope.model.as_deref(), Some("opus"));
            }
            other => panic!("expected message fact, got {:?}", other),
        }
        assert!(matches!(&facts[1], Fact::ToolStart { id, name, .. }
            if id == "toolu_1" && name == "Glob"));
    }

    #[test]
    fn test_ask_user_tool_adds_question_request() {
        let msg = decode(serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "q1", "name": "AskUserQuestion",
                 "input": {"question": "Proceed?"}},
            ]},
        }));
        let facts = normalize(&msg, 200);
        // message + tool_start + question_request
        assert_eq!(facts.len(), 3);
        assert!(matches!(&facts[2], Fact::QuestionRequest { id, .. } if id == "q1"));
    }

    #[test]
    fn test_delegation_adds_subagent_start() {
        let msg = decode(serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "t1", "name": "Task",
                 "input": {"subagent_type": "Researcher", "description": "dig in"}},
            ]},
        }));
        let facts = normalize(&msg, 200);
        assert_eq!(facts.len(), 3);
        match &facts[2] {
            Fact::SubagentStart { id, info } => {
                assert_eq!(id, "t1");
                assert_eq!(info.agent_type, "Researcher");
            }
            other => panic!("expected subagent start, got {:?}", other),
        }
    }

    #[test]
    fn test_user_turn_tool_results() {
        let msg = decode(serde_json::json!({
            "type": "user",
            "uuid": "msg-9",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "toolu_1",
                 "content": "src/main.rs\nsrc/lib.rs", "is_error": false},
            ]},
        }));
        let facts = normalize(&msg, 200);
        assert_eq!(facts.len(), 2);
        assert!(matches!(&facts[0], Fact::ToolResult { id, is_error: false, .. }
            if id == "toolu_1"));
        match &facts[1] {
            Fact::HumanTurn { uuid, preview } => {
                assert_eq!(uuid.as_deref(), Some("msg-9"));
                assert_eq!(
                    *preview,
                    TurnPreview::ToolResult {
                        id_prefix: "toolu_1".to_string()
                    }
                );
            }
            other => panic!("expected human turn, got {:?}", other),
        }
    }

    #[test]
    fn test_human_text_turn() {
        let msg = decode(serde_json::json!({
            "type": "user",
            "uuid": "msg-1",
            "message": {"content": "list files"},
        }));
        let facts = normalize(&msg, 200);
        assert_eq!(facts.len(), 1);
        assert!(matches!(&facts[0], Fact::HumanTurn { preview: TurnPreview::Text(t), .. }
            if t == "list files"));
    }

    #[test]
    fn test_terminal_result() {
        let msg = decode(serde_json::json!({
            "type": "result",
            "is_error": false,
            "usage": {"input_tokens": 100, "output_tokens": 25},
        }));
        let facts = normalize(&msg, 200);
        assert_eq!(facts.len(), 1);
        match &facts[0] {
            Fact::Terminal { success, usage, .. } => {
                assert!(success);
                assert_eq!(usage.unwrap().input_tokens, 100);
            }
            other => panic!("expected terminal fact, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_line_degrades_to_none() {
        assert!(RuntimeMessage::from_json_line("{not json").is_none());
        assert!(RuntimeMessage::from_json_line(r#"{"type": "warp_drive"}"#).is_some());
        // Unknown kinds decode but normalize to no facts
        let msg = RuntimeMessage::from_json_line(r#"{"type": "warp_drive"}"#).unwrap();
        assert!(normalize(&msg, 200).is_empty());
    }

    #[test]
    fn test_result_preview_block_array() {
        let content = serde_json::json!([{"type": "text", "text": "hello"}]);
        assert_eq!(result_preview(&content, 200), "hello");
        assert_eq!(result_preview(&serde_json::Value::Null, 200), "");
    }
}
