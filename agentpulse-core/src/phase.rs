//! Phase inference
//!
//! Classifies each completed tool call into a coarse execution phase using a
//! name/keyword heuristic. Matching is case-insensitive and substring-based,
//! which means tool names that merely contain a keyword (an MCP tool called
//! `get-deployment-status` that actually mutates state, say) can be
//! misclassified as reads. That risk is accepted and pinned by tests; the
//! heuristic is intentionally approximate.

use crate::types::{Phase, ProgressSnapshot};

/// Tool names containing any of these are planning activity.
const PLAN_MARKERS: &[&str] = &["todo", "plan"];

/// Write/execute vocabulary, including verb-prefixed variants.
const WRITE_KEYWORDS: &[&str] = &[
    "write", "edit", "execute", "run", "create", "update", "delete", "post-", "put-",
];

/// Read/query vocabulary.
const READ_KEYWORDS: &[&str] = &[
    "read", "search", "list", "fetch", "query", "get", "glob", "grep", "find",
];

/// Completed-call count after which read-like tools are treated as
/// verification rather than context gathering.
const READ_TURNOVER: u32 = 5;

/// Classify one completed tool call.
///
/// Precedence: plan markers, then write/execute keywords, then read keywords
/// split on the completed-count turnover. Returns `None` when nothing
/// matches, leaving the current phase unchanged.
pub fn classify(tool_name: &str, completed_count: u32) -> Option<Phase> {
    let name = tool_name.to_lowercase();

    if PLAN_MARKERS.iter().any(|kw| name.contains(kw)) {
        return Some(Phase::Planning);
    }

    if WRITE_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        return Some(Phase::Executing);
    }

    if READ_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        // Late reads are assumed to be checking earlier writes
        return Some(if completed_count <= READ_TURNOVER {
            Phase::GatheringContext
        } else {
            Phase::Verifying
        });
    }

    None
}

/// Holds the single current phase for a session and the completed-call count.
///
/// Only this engine writes the progress cell; transitions are not strictly
/// monotonic.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    current: Phase,
    completed: u32,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one closed tool call and return the updated snapshot.
    pub fn on_tool_closed(&mut self, tool_name: &str) -> ProgressSnapshot {
        self.completed += 1;
        if let Some(phase) = classify(tool_name, self.completed) {
            self.current = phase;
        }
        ProgressSnapshot {
            phase: self.current,
            completed_tools: self.completed,
            current_tool: Some(tool_name.to_string()),
        }
    }

    /// Mark the session finished.
    pub fn mark_completed(&mut self) -> ProgressSnapshot {
        self.current = Phase::Completed;
        ProgressSnapshot {
            phase: self.current,
            completed_tools: self.completed,
            current_tool: None,
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn completed_count(&self) -> u32 {
        self.completed
    }
}
