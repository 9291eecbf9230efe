//! Idle / heartbeat monitoring
//!
//! A periodic check, independent of message arrival, that synthesizes status
//! events when no activity has been observed recently. The producer drives
//! [`HeartbeatState::tick`] from a fixed `tokio::time::interval`; the state
//! here is pure so the phrasing and thresholds are testable without timers.
//!
//! Idle math runs on the monotonic clock. Every real message resets the
//! activity clock via [`HeartbeatState::touch`].

use std::time::{Duration, Instant};

use crate::types::StreamStatus;

/// A tool that finished within this window colors the sub-agent status line.
const RECENT_TOOL_FOR_SUBAGENT: Duration = Duration::from_secs(5);

/// A tool that finished within this window produces `waiting_for_model`.
const RECENT_TOOL_FOR_ANALYSIS: Duration = Duration::from_secs(60);

/// One synthesized status, ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: StreamStatus,
    pub message: String,
    pub idle_seconds: u64,
    pub last_tool_name: Option<String>,
    pub active_subagents: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
struct LastTool {
    name: String,
    finished_at: Instant,
}

/// Per-session heartbeat state owned by the producer.
#[derive(Debug)]
pub struct HeartbeatState {
    idle_threshold: Duration,
    last_activity: Instant,
    last_tool: Option<LastTool>,
}

impl HeartbeatState {
    pub fn new(idle_threshold: Duration, now: Instant) -> Self {
        Self {
            idle_threshold,
            last_activity: now,
            last_tool: None,
        }
    }

    /// Reset the activity clock; called for every real message.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Record a completed tool for status phrasing.
    pub fn record_tool(&mut self, name: &str, now: Instant) {
        self.last_tool = Some(LastTool {
            name: name.to_string(),
            finished_at: now,
        });
    }

    /// Evaluate one heartbeat tick.
    ///
    /// Silent below the idle threshold. Above it, exactly one status per tick
    /// with priority: active sub-agents, then a recently completed tool, then
    /// plain thinking.
    pub fn tick(&self, now: Instant, active_subagents: &[String]) -> Option<StatusUpdate> {
        let idle = now.saturating_duration_since(self.last_activity);
        if idle < self.idle_threshold {
            return None;
        }
        let idle_seconds = idle.as_secs();

        let recent_tool = |window: Duration| -> Option<&LastTool> {
            self.last_tool
                .as_ref()
                .filter(|t| now.saturating_duration_since(t.finished_at) <= window)
        };

        if !active_subagents.is_empty() {
            let names = active_subagents.join(", ");
            let message = match recent_tool(RECENT_TOOL_FOR_SUBAGENT) {
                Some(tool) => format!("Sub-agent running: {} (last tool: {})", names, tool.name),
                None => format!("Sub-agent running: {}", names),
            };
            return Some(StatusUpdate {
                status: StreamStatus::SubagentRunning,
                message,
                idle_seconds,
                last_tool_name: self.last_tool.as_ref().map(|t| t.name.clone()),
                active_subagents: Some(active_subagents.to_vec()),
            });
        }

        if let Some(tool) = recent_tool(RECENT_TOOL_FOR_ANALYSIS) {
            return Some(StatusUpdate {
                status: StreamStatus::WaitingForModel,
                message: format!("Analyzing {}...", tool.name),
                idle_seconds,
                last_tool_name: Some(tool.name.clone()),
                active_subagents: None,
            });
        }

        Some(StatusUpdate {
            status: StreamStatus::Thinking,
            message: "Thinking...".to_string(),
            idle_seconds,
            last_tool_name: None,
            active_subagents: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_millis(500);

    #[test]
    fn test_silent_below_threshold() {
        let t0 = Instant::now();
        let state = HeartbeatState::new(IDLE, t0);
        assert!(state.tick(t0 + Duration::from_millis(499), &[]).is_none());
        assert!(state.tick(t0, &[]).is_none());
    }

    #[test]
    fn test_thinking_at_two_seconds_idle() {
        let t0 = Instant::now();
        let state = HeartbeatState::new(IDLE, t0);
        let update = state.tick(t0 + Duration::from_secs(2), &[]).unwrap();
        assert_eq!(update.status, StreamStatus::Thinking);
        assert_eq!(update.idle_seconds, 2);
        assert_eq!(update.last_tool_name, None);
    }

    #[test]
    fn test_recent_tool_means_waiting_for_model() {
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(IDLE, t0);
        state.record_tool("Read", t0);

        let update = state.tick(t0 + Duration::from_secs(30), &[]).unwrap();
        assert_eq!(update.status, StreamStatus::WaitingForModel);
        assert_eq!(update.message, "Analyzing Read...");
        assert_eq!(update.last_tool_name.as_deref(), Some("Read"));

        // Past the 60s window the tool no longer counts
        let update = state.tick(t0 + Duration::from_secs(61), &[]).unwrap();
        assert_eq!(update.status, StreamStatus::Thinking);
    }

    #[test]
    fn test_subagents_take_priority() {
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(IDLE, t0);
        state.record_tool("Read", t0);

        let active = vec!["Researcher".to_string(), "Reviewer".to_string()];
        let update = state.tick(t0 + Duration::from_secs(2), &active).unwrap();
        assert_eq!(update.status, StreamStatus::SubagentRunning);
        assert_eq!(
            update.message,
            "Sub-agent running: Researcher, Reviewer (last tool: Read)"
        );
        assert_eq!(
            update.active_subagents.as_deref(),
            Some(&["Researcher".to_string(), "Reviewer".to_string()][..])
        );

        // A tool older than 5s is dropped from the sub-agent phrasing
        let update = state.tick(t0 + Duration::from_secs(10), &active).unwrap();
        assert_eq!(update.message, "Sub-agent running: Researcher, Reviewer");
    }

    #[test]
    fn test_touch_resets_idle() {
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(IDLE, t0);
        state.touch(t0 + Duration::from_secs(5));
        assert!(state
            .tick(t0 + Duration::from_secs(5) + Duration::from_millis(100), &[])
            .is_none());
    }
}
