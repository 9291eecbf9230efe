//! Core domain types for agentpulse
//!
//! These types model the lifecycle of a streamed agent session: tool calls
//! matched to their results, delegated sub-agents, the coarse execution
//! phase, restorable checkpoints, and the progress snapshot the consumer
//! renders from.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One live agent execution observed end to end |
//! | **Tool call** | An invocation the agent makes, keyed by a correlation id |
//! | **Sub-agent** | A named child execution delegated by a tool call |
//! | **Phase** | Heuristically inferred stage of the agent's current activity |
//! | **Checkpoint** | A restorable marker tied to a point in the agent transcript |
//! | **Frame** | One tagged event on the streaming connection (see `protocol`) |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Phase
// ============================================

/// Coarse execution phase inferred from completed tool calls.
///
/// Transitions are not strictly monotonic: read-heavy activity late in a
/// session is classified as verification rather than context gathering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    GatheringContext,
    Planning,
    Executing,
    Verifying,
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::GatheringContext => "gathering_context",
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::Verifying => "verifying",
            Phase::Completed => "completed",
        }
    }

    /// Returns the display name for this phase
    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::GatheringContext => "Gathering context",
            Phase::Planning => "Planning",
            Phase::Executing => "Executing",
            Phase::Verifying => "Verifying",
            Phase::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gathering_context" => Ok(Phase::GatheringContext),
            "planning" => Ok(Phase::Planning),
            "executing" => Ok(Phase::Executing),
            "verifying" => Ok(Phase::Verifying),
            "completed" => Ok(Phase::Completed),
            _ => Err(format!("unknown phase: {}", s)),
        }
    }
}

// ============================================
// Tool Activity
// ============================================

/// Status of a tracked tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Completed,
    Failed,
    /// Still running past the slow threshold (consumer-local inference)
    Slow,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Running => "running",
            ToolStatus::Completed => "completed",
            ToolStatus::Failed => "failed",
            ToolStatus::Slow => "slow",
        }
    }

    /// Running and slow calls are both still in flight.
    pub fn is_open(&self) -> bool {
        matches!(self, ToolStatus::Running | ToolStatus::Slow)
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tool call as tracked by the consumer.
///
/// Appended when a `tool_start` frame arrives and updated in place when the
/// matching `tool_result` frame closes it. The consumer's slow-scan timer may
/// flip `Running` to `Slow` without ending the running period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolActivity {
    /// Correlation id linking start and result
    pub id: String,
    /// Tool name as reported by the runtime
    pub name: String,
    /// Opaque structured invocation payload
    pub input: serde_json::Value,
    /// Current status
    pub status: ToolStatus,
    /// When the call started (producer wall clock)
    pub started_at: DateTime<Utc>,
    /// When the result arrived, if it has
    pub ended_at: Option<DateTime<Utc>>,
    /// Total running time in milliseconds, once closed
    pub duration_ms: Option<u64>,
    /// Truncated output preview, once closed
    pub output_preview: Option<String>,
    /// Display name of the delegated sub-agent, for delegation calls
    pub subagent_name: Option<String>,
}

// ============================================
// Sub-agents
// ============================================

/// Declared identity of a delegated sub-agent, as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubagentInfo {
    /// Sub-agent display name (e.g., "Researcher")
    pub agent_type: String,
    /// Best-effort description of the delegated purpose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An active sub-agent tracked by the producer.
#[derive(Debug, Clone)]
pub struct SubagentRecord {
    pub name: String,
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
}

// ============================================
// Progress
// ============================================

/// Single mutable progress cell per session; last write wins on the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Current inferred phase
    pub phase: Phase,
    /// Number of tool calls closed so far
    pub completed_tools: u32,
    /// Most recently closed tool, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tool: Option<String>,
}

// ============================================
// Checkpoints
// ============================================

/// Maximum characters kept in a checkpoint preview.
pub const CHECKPOINT_PREVIEW_CHARS: usize = 100;

/// A restorable marker created on a qualifying human turn.
///
/// Immutable after creation; ordering is append-only, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCheckpoint {
    /// Checkpoint id (uuid v4)
    pub id: String,
    /// Correlates to a point in the agent's own transcript for later rewind
    pub message_uuid: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Short content preview (at most [`CHECKPOINT_PREVIEW_CHARS`] chars)
    pub preview: String,
    /// Always true at creation; no retroactive invalidation here
    pub can_rewind: bool,
}

// ============================================
// Usage
// ============================================

/// Token usage totals carried on the terminal result event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ============================================
// Messages
// ============================================

/// Normalized envelope for a finalized assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Author role ("assistant" for normalized turns)
    pub role: String,
    /// Backing model, when the runtime reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Concatenated text content, truncated for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Number of tool invocations embedded in the turn
    pub tool_use_count: u32,
}

// ============================================
// Stream status
// ============================================

/// Synthetic status kinds emitted by the idle monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Thinking,
    WaitingForModel,
    SubagentRunning,
    ContainerInit,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Thinking => "thinking",
            StreamStatus::WaitingForModel => "waiting_for_model",
            StreamStatus::SubagentRunning => "subagent_running",
            StreamStatus::ContainerInit => "container_init",
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Helpers
// ============================================

/// Truncate a string to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    if input.chars().count() <= max_chars {
        return input;
    }
    input
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| &input[..idx])
        .unwrap_or(input)
}
