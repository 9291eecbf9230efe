//! Tool call correlation
//!
//! Tracks in-flight tool invocations keyed by correlation id and matches
//! results to starts. Guarantees: at most one close per id, and every closed
//! record carries a non-negative duration (measured on the monotonic clock,
//! while wire timestamps stay on the wall clock).

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};

/// An in-flight tool invocation.
#[derive(Debug, Clone)]
pub struct InFlightCall {
    pub name: String,
    pub input: serde_json::Value,
    pub started_wall: DateTime<Utc>,
    started_at: Instant,
    /// Set when the tracker recognizes the call as a delegation
    pub subagent_name: Option<String>,
}

/// A closed tool invocation, returned to downstream consumers
/// (phase engine, sub-agent tracker).
#[derive(Debug, Clone)]
pub struct ClosedCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub success: bool,
    pub duration_ms: u64,
    pub started_wall: DateTime<Utc>,
    pub output_preview: String,
    pub subagent_name: Option<String>,
}

/// In-flight tool map; `running` entries only.
#[derive(Debug, Default)]
pub struct ToolCallCorrelator {
    in_flight: HashMap<String, InFlightCall>,
}

impl ToolCallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool invocation start.
    ///
    /// Rejects (no-op, returns false) if the id is already in flight, so a
    /// given id produces at most one `tool_start` downstream.
    pub fn on_start(&mut self, id: &str, name: &str, input: serde_json::Value) -> bool {
        if self.in_flight.contains_key(id) {
            tracing::warn!(tool_call_id = id, tool_name = name, "duplicate tool start ignored");
            return false;
        }
        self.in_flight.insert(
            id.to_string(),
            InFlightCall {
                name: name.to_string(),
                input,
                started_wall: Utc::now(),
                started_at: Instant::now(),
                subagent_name: None,
            },
        );
        true
    }

    /// Attach a sub-agent display name to an in-flight delegation call.
    pub fn set_subagent(&mut self, id: &str, name: &str) {
        if let Some(call) = self.in_flight.get_mut(id) {
            call.subagent_name = Some(name.to_string());
        }
    }

    /// Match a result to its start.
    ///
    /// A result whose id has no in-flight record is dropped (logged, never
    /// matched). Otherwise the entry is removed and the closed record
    /// returned; duration is non-negative by construction.
    pub fn on_result(&mut self, id: &str, is_error: bool, output_preview: &str) -> Option<ClosedCall> {
        let Some(call) = self.in_flight.remove(id) else {
            tracing::warn!(tool_call_id = id, "dropping tool result with no matching start");
            return None;
        };

        Some(ClosedCall {
            id: id.to_string(),
            name: call.name,
            input: call.input,
            success: !is_error,
            duration_ms: call.started_at.elapsed().as_millis() as u64,
            started_wall: call.started_wall,
            output_preview: output_preview.to_string(),
            subagent_name: call.subagent_name,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Names of calls still in flight (used when tearing down a session that
    /// ended with unmatched starts).
    pub fn open_names(&self) -> Vec<String> {
        self.in_flight.values().map(|c| c.name.clone()).collect()
    }

    /// Drop all in-flight entries (teardown path).
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
