//! Wire protocol for the streaming connection
//!
//! Every event crossing the connection is one [`EventFrame`]: a tagged
//! [`ActivityEvent`] plus the session id and an ISO-8601 timestamp. Frames are
//! serialized as newline-delimited JSON, one object per line, written in strict
//! emission order with no reordering or batching.
//!
//! Consumers must tolerate future event kinds: an unrecognized `type` tag
//! deserializes to [`ActivityEvent::Unknown`] and is ignored by the reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    MessageEnvelope, ProgressSnapshot, SessionCheckpoint, StreamStatus, SubagentInfo, UsageTotals,
};

/// One frame on the streaming connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ActivityEvent,
}

impl EventFrame {
    /// Create a frame stamped with the current wall clock.
    pub fn new(session_id: impl Into<String>, event: ActivityEvent) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// The closed event catalogue.
///
/// One case per event kind; exhaustive matching is enforced at compile time
/// everywhere except [`ActivityEvent::Unknown`], which absorbs future tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// Connection established; first frame of every session
    Connection,

    /// Synthetic status from the idle monitor
    #[serde(rename_all = "camelCase")]
    Status {
        status: StreamStatus,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        idle_seconds: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_tool_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        active_subagents: Option<Vec<String>>,
    },

    /// Character-level text delta
    Partial { delta: String },

    /// Finalized assistant turn
    Message { message: MessageEnvelope },

    /// Tool invocation started
    #[serde(rename_all = "camelCase")]
    ToolStart {
        tool_call_id: String,
        tool_name: String,
        tool_input: serde_json::Value,
    },

    /// The reserved ask-the-user tool was invoked
    #[serde(rename_all = "camelCase")]
    QuestionRequest {
        tool_call_id: String,
        question_request: serde_json::Value,
    },

    /// Tool invocation closed with a matched result
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        /// Running time in milliseconds
        duration: u64,
        output_preview: String,
    },

    /// A delegating tool call spawned a named sub-agent
    #[serde(rename_all = "camelCase")]
    SubagentStart {
        tool_call_id: String,
        subagent_info: SubagentInfo,
    },

    /// A previously started sub-agent finished
    #[serde(rename_all = "camelCase")]
    SubagentStop {
        tool_call_id: String,
        subagent_name: String,
        success: bool,
        /// Elapsed time in milliseconds
        duration: u64,
    },

    /// Restorable checkpoint marker for a human turn
    Checkpoint { checkpoint: SessionCheckpoint },

    /// Progress snapshot (last write wins)
    Progress { data: ProgressSnapshot },

    /// Terminal outcome reported by the agent runtime
    Result {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageTotals>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Session finished; last frame on a successful connection
    #[serde(rename_all = "camelCase")]
    Complete { message_count: u64 },

    /// Producer-level failure; last frame on a failed connection
    Error { error: String },

    /// Unrecognized future event kind; consumers ignore it
    #[serde(other)]
    Unknown,
}

impl ActivityEvent {
    /// Wire tag for this event kind (the `type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::Connection => "connection",
            ActivityEvent::Status { .. } => "status",
            ActivityEvent::Partial { .. } => "partial",
            ActivityEvent::Message { .. } => "message",
            ActivityEvent::ToolStart { .. } => "tool_start",
            ActivityEvent::QuestionRequest { .. } => "question_request",
            ActivityEvent::ToolResult { .. } => "tool_result",
            ActivityEvent::SubagentStart { .. } => "subagent_start",
            ActivityEvent::SubagentStop { .. } => "subagent_stop",
            ActivityEvent::Checkpoint { .. } => "checkpoint",
            ActivityEvent::Progress { .. } => "progress",
            ActivityEvent::Result { .. } => "result",
            ActivityEvent::Complete { .. } => "complete",
            ActivityEvent::Error { .. } => "error",
            ActivityEvent::Unknown => "unknown",
        }
    }

    /// Terminal events end the session on both sides.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActivityEvent::Complete { .. } | ActivityEvent::Error { .. }
        )
    }
}

/// Serialize a frame to one JSON line (without the trailing newline).
pub fn encode_frame(frame: &EventFrame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse one JSON line back into a frame.
///
/// Unknown `type` tags succeed and yield [`ActivityEvent::Unknown`]; malformed
/// JSON is an error the caller decides how to surface.
pub fn decode_frame(line: &str) -> Result<EventFrame> {
    Ok(serde_json::from_str(line.trim())?)
}
