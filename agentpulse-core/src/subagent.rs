//! Sub-agent lifecycle tracking
//!
//! A tool invocation that delegates to a named sub-agent is still tracked by
//! the correlator like any other call, but additionally enters the active
//! sub-agent set here. The set is keyed by the owning tool-call id and
//! insertion-ordered, so when one of several concurrent sub-agents finishes,
//! the most recently remaining name becomes the current context for status
//! phrasing.

use chrono::{DateTime, Utc};

use crate::types::{SubagentInfo, SubagentRecord, truncate_chars};

/// Tool name that delegates work to a sub-agent.
const DELEGATION_TOOL: &str = "task";

/// Input field declaring the sub-agent to delegate to.
const SUBAGENT_MARKER: &str = "subagent_type";

/// Maximum characters kept in the extracted description.
const DESCRIPTION_CHARS: usize = 120;

/// Fallback label when the invocation declares no purpose.
const GENERIC_DESCRIPTION: &str = "Delegated task";

/// Detect whether a tool invocation delegates to a sub-agent.
///
/// Either the tool name itself is the delegation tool, or the input carries a
/// declared sub-agent marker.
pub fn is_delegation(tool_name: &str, input: &serde_json::Value) -> bool {
    tool_name.eq_ignore_ascii_case(DELEGATION_TOOL)
        || input.get(SUBAGENT_MARKER).and_then(|v| v.as_str()).is_some()
}

impl SubagentInfo {
    /// Extract the declared identity from a delegating invocation.
    ///
    /// The display name comes from the sub-agent marker, falling back to the
    /// tool name. The description is a best-effort parse of the invocation's
    /// declared purpose field.
    pub fn from_invocation(tool_name: &str, input: &serde_json::Value) -> Self {
        let agent_type = input
            .get(SUBAGENT_MARKER)
            .and_then(|v| v.as_str())
            .unwrap_or(tool_name)
            .to_string();

        let description = input
            .get("description")
            .or_else(|| input.get("prompt"))
            .and_then(|v| v.as_str())
            .map(|s| truncate_chars(s, DESCRIPTION_CHARS).to_string())
            .or_else(|| Some(GENERIC_DESCRIPTION.to_string()));

        Self {
            agent_type,
            description,
        }
    }
}

/// Tracks the set of currently active sub-agents, keyed by tool-call id.
#[derive(Debug, Default)]
pub struct SubagentTracker {
    /// Insertion-ordered; the last entry is the current context
    active: Vec<(String, SubagentRecord)>,
}

impl SubagentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delegation start. Returns false (no-op) if the id is
    /// already tracked, so at most one `subagent_start` is emitted per id.
    pub fn on_start(&mut self, tool_call_id: &str, info: &SubagentInfo, now: DateTime<Utc>) -> bool {
        if self.active.iter().any(|(id, _)| id == tool_call_id) {
            tracing::warn!(tool_call_id, "duplicate sub-agent start ignored");
            return false;
        }
        self.active.push((
            tool_call_id.to_string(),
            SubagentRecord {
                name: info.agent_type.clone(),
                description: info.description.clone(),
                started_at: now,
            },
        ));
        true
    }

    /// Remove the sub-agent owned by this tool-call id, if any.
    ///
    /// Returns the removed record; an unknown id is a no-op.
    pub fn on_close(&mut self, tool_call_id: &str) -> Option<SubagentRecord> {
        let idx = self.active.iter().position(|(id, _)| id == tool_call_id)?;
        Some(self.active.remove(idx).1)
    }

    /// Names of all currently active sub-agents, oldest first.
    pub fn active_names(&self) -> Vec<String> {
        self.active.iter().map(|(_, r)| r.name.clone()).collect()
    }

    /// The current sub-agent context: the most recently remaining entry.
    pub fn current(&self) -> Option<&str> {
        self.active.last().map(|(_, r)| r.name.as_str())
    }

    /// All active names joined for status phrasing.
    pub fn joined_names(&self) -> String {
        self.active_names().join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Drop all tracked sub-agents (teardown path).
    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> SubagentInfo {
        SubagentInfo {
            agent_type: name.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_is_delegation() {
        assert!(is_delegation("Task", &serde_json::json!({})));
        assert!(is_delegation("task", &serde_json::json!({})));
        assert!(is_delegation(
            "spawn_agent",
            &serde_json::json!({"subagent_type": "Researcher"})
        ));
        assert!(!is_delegation("Read", &serde_json::json!({"file": "x"})));
    }

    #[test]
    fn test_info_extraction() {
        let input = serde_json::json!({
            "subagent_type": "Researcher",
            "description": "Survey prior art",
            "prompt": "Find everything about...",
        });
        let info = SubagentInfo::from_invocation("Task", &input);
        assert_eq!(info.agent_type, "Researcher");
        assert_eq!(info.description.as_deref(), Some("Survey prior art"));

        // No declared purpose falls back to the generic label
        let info = SubagentInfo::from_invocation("Task", &serde_json::json!({}));
        assert_eq!(info.agent_type, "Task");
        assert_eq!(info.description.as_deref(), Some(GENERIC_DESCRIPTION));
    }

    #[test]
    fn test_start_stop_symmetry() {
        let mut tracker = SubagentTracker::new();
        let now = Utc::now();

        assert!(tracker.on_start("id-1", &info("Researcher"), now));
        assert!(tracker.on_start("id-2", &info("Reviewer"), now));
        // Duplicate start is a no-op
        assert!(!tracker.on_start("id-1", &info("Researcher"), now));
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.joined_names(), "Researcher, Reviewer");
        assert_eq!(tracker.current(), Some("Reviewer"));

        let closed = tracker.on_close("id-2").unwrap();
        assert_eq!(closed.name, "Reviewer");
        assert_eq!(tracker.current(), Some("Researcher"));

        // Unknown id is a no-op
        assert!(tracker.on_close("id-404").is_none());

        tracker.on_close("id-1");
        assert!(tracker.is_empty());
        assert_eq!(tracker.current(), None);
    }
}
