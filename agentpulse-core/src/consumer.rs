//! Stream consumption
//!
//! The consumer side of the pipeline: a pure reducer over the ordered frame
//! sequence. Each frame folds into a view state snapshot that a renderer can
//! display at any time; the reducer itself performs no I/O, so the whole state
//! machine is testable by feeding it frames.
//!
//! Frames with an unrecognized tag are ignored, which is what lets older
//! consumers survive newer producers. A local slow-scan timer flips tool calls
//! that have been running past the configured threshold to `slow` without
//! waiting for the producer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::protocol::{ActivityEvent, EventFrame};
use crate::types::{
    MessageEnvelope, ProgressSnapshot, SessionCheckpoint, StreamStatus, SubagentInfo, ToolActivity,
    ToolStatus, UsageTotals,
};

/// How often the running consumer re-scans for slow tool calls.
const SLOW_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// A question the agent asked the human, still awaiting an answer.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub tool_call_id: String,
    pub request: serde_json::Value,
}

/// View state folded from the frame stream.
#[derive(Debug, Default)]
pub struct StreamConsumer {
    slow_threshold: Duration,

    /// Session id from the connection frame
    pub session_id: Option<String>,
    /// True once the connection frame has arrived
    pub connected: bool,
    /// True while partial deltas are accumulating
    pub is_streaming: bool,
    /// Accumulated partial text, cleared when the turn finalizes
    pub streaming_text: String,
    /// Latest human-readable status line
    pub current_activity: Option<String>,
    /// Latest synthetic status kind
    pub status: Option<StreamStatus>,
    /// All tool calls observed, in start order
    pub tool_activities: Vec<ToolActivity>,
    /// Finalized assistant turns, in arrival order
    pub messages: Vec<MessageEnvelope>,
    /// Currently active sub-agents, keyed by owning tool-call id
    pub active_subagents: Vec<(String, SubagentInfo)>,
    /// Single progress cell; last write wins
    pub progress: Option<ProgressSnapshot>,
    /// Checkpoint markers, append-only, newest last
    pub checkpoints: Vec<SessionCheckpoint>,
    /// Outstanding question, cleared when its tool call closes
    pub pending_question: Option<PendingQuestion>,
    /// Token usage from the terminal result
    pub usage: Option<UsageTotals>,
    /// Terminal success flag, once reported
    pub success: Option<bool>,
    /// Error text from a terminal error or failed result
    pub error: Option<String>,
    /// Message count reported on the completion frame
    pub message_count: Option<u64>,
    /// True once a terminal frame (or channel close) ended the session
    pub done: bool,
}

impl StreamConsumer {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            ..Self::default()
        }
    }

    /// Fold one frame into the view state.
    pub fn handle_frame(&mut self, frame: EventFrame) {
        let timestamp = frame.timestamp;
        match frame.event {
            ActivityEvent::Connection => {
                self.connected = true;
                self.session_id = Some(frame.session_id);
            }
            ActivityEvent::Status {
                status, message, ..
            } => {
                self.status = Some(status);
                self.current_activity = Some(message);
            }
            ActivityEvent::Partial { delta } => {
                self.is_streaming = true;
                self.streaming_text.push_str(&delta);
            }
            ActivityEvent::Message { message } => {
                // The finalized turn supersedes the accumulated deltas
                self.is_streaming = false;
                self.streaming_text.clear();
                self.messages.push(message);
            }
            ActivityEvent::ToolStart {
                tool_call_id,
                tool_name,
                tool_input,
            } => {
                self.current_activity = Some(format!("Running {}...", tool_name));
                self.tool_activities.push(ToolActivity {
                    id: tool_call_id,
                    name: tool_name,
                    input: tool_input,
                    status: ToolStatus::Running,
                    started_at: timestamp,
                    ended_at: None,
                    duration_ms: None,
                    output_preview: None,
                    subagent_name: None,
                });
            }
            ActivityEvent::QuestionRequest {
                tool_call_id,
                question_request,
            } => {
                self.pending_question = Some(PendingQuestion {
                    tool_call_id,
                    request: question_request,
                });
            }
            ActivityEvent::ToolResult {
                tool_call_id,
                success,
                duration,
                output_preview,
                ..
            } => {
                if let Some(activity) = self
                    .tool_activities
                    .iter_mut()
                    .find(|a| a.id == tool_call_id)
                {
                    activity.status = if success {
                        ToolStatus::Completed
                    } else {
                        ToolStatus::Failed
                    };
                    activity.ended_at = Some(timestamp);
                    activity.duration_ms = Some(duration);
                    activity.output_preview = Some(output_preview);
                }
                if self
                    .pending_question
                    .as_ref()
                    .is_some_and(|q| q.tool_call_id == tool_call_id)
                {
                    self.pending_question = None;
                }
            }
            ActivityEvent::SubagentStart {
                tool_call_id,
                subagent_info,
            } => {
                if let Some(activity) = self
                    .tool_activities
                    .iter_mut()
                    .find(|a| a.id == tool_call_id)
                {
                    activity.subagent_name = Some(subagent_info.agent_type.clone());
                }
                if !self.active_subagents.iter().any(|(id, _)| *id == tool_call_id) {
                    self.active_subagents.push((tool_call_id, subagent_info));
                }
            }
            ActivityEvent::SubagentStop { tool_call_id, .. } => {
                self.active_subagents.retain(|(id, _)| *id != tool_call_id);
            }
            ActivityEvent::Checkpoint { checkpoint } => {
                self.checkpoints.push(checkpoint);
            }
            ActivityEvent::Progress { data } => {
                self.progress = Some(data);
            }
            ActivityEvent::Result {
                success,
                usage,
                error,
            } => {
                self.success = Some(success);
                self.usage = usage;
                if error.is_some() {
                    self.error = error;
                }
            }
            ActivityEvent::Complete { message_count } => {
                self.message_count = Some(message_count);
                self.finish();
            }
            ActivityEvent::Error { error } => {
                self.error = Some(error);
                self.success = Some(false);
                self.finish();
            }
            ActivityEvent::Unknown => {
                tracing::debug!("ignoring unrecognized frame kind");
            }
        }
    }

    /// Flip tool calls running past the slow threshold to `slow`.
    ///
    /// Local inference only; the producer never reports slowness. The slow
    /// state stays in flight and the eventual result still closes it normally.
    pub fn scan_slow(&mut self, now: DateTime<Utc>) {
        let threshold_ms = self.slow_threshold.as_millis() as i64;
        for activity in &mut self.tool_activities {
            if activity.status == ToolStatus::Running {
                let running_ms = now
                    .signed_duration_since(activity.started_at)
                    .num_milliseconds();
                if running_ms > threshold_ms {
                    tracing::debug!(
                        tool_call_id = %activity.id,
                        tool_name = %activity.name,
                        "tool call running slow"
                    );
                    activity.status = ToolStatus::Slow;
                }
            }
        }
    }

    /// End the session view. Idempotent; also invoked when the connection
    /// drops without a terminal frame.
    pub fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.is_streaming = false;
        self.current_activity = None;
    }

    /// Tool calls still in flight (running or slow).
    pub fn open_tools(&self) -> impl Iterator<Item = &ToolActivity> {
        self.tool_activities.iter().filter(|a| a.status.is_open())
    }

    /// Drain the frame channel to completion, running the slow scan on a
    /// local timer. Returns the final view state.
    pub async fn run(mut self, mut frames: mpsc::Receiver<EventFrame>) -> Self {
        let mut ticker = tokio::time::interval(SLOW_SCAN_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        self.handle_frame(frame);
                        if self.done {
                            break;
                        }
                    }
                    None => {
                        // Producer went away without a terminal frame
                        tracing::warn!("frame stream closed before completion");
                        self.finish();
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.scan_slow(Utc::now());
                }
            }
        }
        self
    }
}
