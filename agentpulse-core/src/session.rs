//! Session lifecycle management
//!
//! The producer side of the pipeline: one [`SessionProducer`] per streamed
//! session owns the correlator, sub-agent tracker, phase engine, checkpoint
//! emitter, and heartbeat state, and drives them from the upstream runtime
//! message channel. Every fact and synthesized status goes out on one ordered
//! frame channel; the channel, not ad hoc interleaving, is what guarantees
//! single-writer ordering.
//!
//! Teardown is a single one-shot function invoked from all three exit paths:
//! normal completion, producer-side error, and consumer disconnect (observed
//! as the frame channel closing). Whichever fires first wins; later
//! invocations are no-ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::checkpoint::CheckpointEmitter;
use crate::config::StreamConfig;
use crate::correlate::ToolCallCorrelator;
use crate::error::Error;
use crate::monitor::HeartbeatState;
use crate::normalize::{self, Fact, RuntimeMessage};
use crate::phase::PhaseTracker;
use crate::protocol::{ActivityEvent, EventFrame};
use crate::subagent::SubagentTracker;

// ============================================
// Options
// ============================================

/// Per-session producer configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub session_id: String,
    pub checkpoints_enabled: bool,
    pub heartbeat_interval: Duration,
    pub idle_threshold: Duration,
    pub preview_chars: usize,
}

impl SessionOptions {
    /// Build options for a session from the stream configuration.
    pub fn from_config(session_id: impl Into<String>, config: &StreamConfig) -> Self {
        Self {
            session_id: session_id.into(),
            checkpoints_enabled: config.checkpoints,
            heartbeat_interval: config.heartbeat_interval(),
            idle_threshold: config.idle_threshold(),
            preview_chars: config.preview_chars,
        }
    }
}

// ============================================
// Execution registry
// ============================================

/// Registry entry for a live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
}

/// Maps session id to producer handle.
///
/// The only state shared across concurrently handled sessions. Registration
/// is last-writer-wins; unregistering an absent id is a no-op.
#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    inner: Mutex<HashMap<String, SessionHandle>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session, overwriting any previous entry for the same id.
    pub fn register(&self, handle: SessionHandle) {
        let session_id = handle.session_id.clone();
        if self.lock().insert(session_id.clone(), handle).is_some() {
            tracing::warn!(session_id = %session_id, "replaced existing registry entry");
        }
    }

    /// Remove a session. Returns false (no-op) if it was not registered.
    pub fn unregister(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ============================================
// Producer
// ============================================

/// How a producer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Terminal result received (or the upstream stream ended cleanly)
    Completed,
    /// The upstream runtime failed; an error frame was emitted
    Failed,
    /// The consumer went away; no further frames could be sent
    Disconnected,
}

/// Marker for a frame send that failed because the consumer disconnected.
struct Disconnected;

/// Per-session producer: consumes raw runtime messages, emits ordered frames.
pub struct SessionProducer {
    opts: SessionOptions,
    registry: Arc<ExecutionRegistry>,
    correlator: ToolCallCorrelator,
    subagents: SubagentTracker,
    phases: PhaseTracker,
    checkpoints: CheckpointEmitter,
    heartbeat: HeartbeatState,
    message_count: u64,
    torn_down: bool,
}

impl SessionProducer {
    pub fn new(opts: SessionOptions, registry: Arc<ExecutionRegistry>) -> Self {
        let heartbeat = HeartbeatState::new(opts.idle_threshold, Instant::now());
        let checkpoints = CheckpointEmitter::new(opts.checkpoints_enabled);
        Self {
            opts,
            registry,
            correlator: ToolCallCorrelator::new(),
            subagents: SubagentTracker::new(),
            phases: PhaseTracker::new(),
            checkpoints,
            heartbeat,
            message_count: 0,
            torn_down: false,
        }
    }

    /// Drive the session to completion.
    ///
    /// `messages` is the upstream agent-runtime sequence (an `Err` item is a
    /// producer-level failure); `frames` is the one-way connection to the
    /// consumer. Returns how the run ended; teardown has already run on every
    /// path by the time this returns.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<Result<RuntimeMessage, Error>>,
        frames: mpsc::Sender<EventFrame>,
    ) -> SessionOutcome {
        self.registry.register(SessionHandle {
            session_id: self.opts.session_id.clone(),
            started_at: Utc::now(),
        });
        tracing::info!(session_id = %self.opts.session_id, "session streaming started");

        if self.emit(&frames, ActivityEvent::Connection).await.is_err() {
            self.teardown();
            return SessionOutcome::Disconnected;
        }

        let mut ticker = tokio::time::interval(self.opts.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                received = messages.recv() => match received {
                    Some(Ok(msg)) => {
                        self.heartbeat.touch(Instant::now());
                        self.message_count += 1;
                        let facts = normalize::normalize(&msg, self.opts.preview_chars);
                        match self.process_facts(facts, &frames).await {
                            Ok(Some(outcome)) => break outcome,
                            Ok(None) => {}
                            Err(Disconnected) => break SessionOutcome::Disconnected,
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(
                            session_id = %self.opts.session_id,
                            error = %e,
                            "agent runtime failed"
                        );
                        // Best effort: the consumer may already be gone
                        let _ = self
                            .emit(&frames, ActivityEvent::Error { error: e.to_string() })
                            .await;
                        break SessionOutcome::Failed;
                    }
                    None => {
                        // Upstream ended without a terminal result; close out
                        tracing::warn!(
                            session_id = %self.opts.session_id,
                            "runtime stream ended without a terminal result"
                        );
                        match self.finish_session(&frames, true, None, None).await {
                            Ok(()) => break SessionOutcome::Completed,
                            Err(Disconnected) => break SessionOutcome::Disconnected,
                        }
                    }
                },
                _ = ticker.tick() => {
                    let active = self.subagents.active_names();
                    if let Some(update) = self.heartbeat.tick(Instant::now(), &active) {
                        let event = ActivityEvent::Status {
                            status: update.status,
                            message: update.message,
                            idle_seconds: Some(update.idle_seconds),
                            last_tool_name: update.last_tool_name,
                            active_subagents: update.active_subagents,
                        };
                        if self.emit(&frames, event).await.is_err() {
                            break SessionOutcome::Disconnected;
                        }
                    }
                }
            }
        };

        self.teardown();
        outcome
    }

    /// Process the facts normalized from one runtime message.
    ///
    /// Returns `Ok(Some(outcome))` when a terminal fact ended the session.
    async fn process_facts(
        &mut self,
        facts: Vec<Fact>,
        frames: &mpsc::Sender<EventFrame>,
    ) -> Result<Option<SessionOutcome>, Disconnected> {
        for fact in facts {
            match fact {
                Fact::Partial { delta } => {
                    self.emit(frames, ActivityEvent::Partial { delta }).await?;
                }
                Fact::Message { envelope } => {
                    self.emit(frames, ActivityEvent::Message { message: envelope })
                        .await?;
                }
                Fact::ToolStart { id, name, input } => {
                    if self.correlator.on_start(&id, &name, input.clone()) {
                        self.emit(
                            frames,
                            ActivityEvent::ToolStart {
                                tool_call_id: id,
                                tool_name: name,
                                tool_input: input,
                            },
                        )
                        .await?;
                    }
                }
                Fact::QuestionRequest { id, request } => {
                    self.emit(
                        frames,
                        ActivityEvent::QuestionRequest {
                            tool_call_id: id,
                            question_request: request,
                        },
                    )
                    .await?;
                }
                Fact::SubagentStart { id, info } => {
                    if self.subagents.on_start(&id, &info, Utc::now()) {
                        self.correlator.set_subagent(&id, &info.agent_type);
                        self.emit(
                            frames,
                            ActivityEvent::SubagentStart {
                                tool_call_id: id,
                                subagent_info: info,
                            },
                        )
                        .await?;
                    }
                }
                Fact::ToolResult {
                    id,
                    is_error,
                    output_preview,
                } => {
                    let Some(closed) = self.correlator.on_result(&id, is_error, &output_preview)
                    else {
                        // Dangling result: dropped, never matched
                        continue;
                    };

                    self.heartbeat.record_tool(&closed.name, Instant::now());

                    self.emit(
                        frames,
                        ActivityEvent::ToolResult {
                            tool_call_id: closed.id.clone(),
                            tool_name: closed.name.clone(),
                            success: closed.success,
                            duration: closed.duration_ms,
                            output_preview: closed.output_preview.clone(),
                        },
                    )
                    .await?;

                    if let Some(record) = self.subagents.on_close(&closed.id) {
                        self.emit(
                            frames,
                            ActivityEvent::SubagentStop {
                                tool_call_id: closed.id.clone(),
                                subagent_name: record.name,
                                success: closed.success,
                                duration: closed.duration_ms,
                            },
                        )
                        .await?;
                    }

                    let snapshot = self.phases.on_tool_closed(&closed.name);
                    self.emit(frames, ActivityEvent::Progress { data: snapshot })
                        .await?;
                }
                Fact::HumanTurn { uuid, preview } => {
                    let checkpoint = self.checkpoints.on_human_turn(
                        &self.opts.session_id,
                        uuid.as_deref(),
                        &preview,
                        Utc::now(),
                    );
                    if let Some(checkpoint) = checkpoint {
                        self.emit(frames, ActivityEvent::Checkpoint { checkpoint })
                            .await?;
                    }
                }
                Fact::Terminal {
                    success,
                    usage,
                    error,
                } => {
                    self.finish_session(frames, success, usage, error).await?;
                    return Ok(Some(SessionOutcome::Completed));
                }
            }
        }
        Ok(None)
    }

    /// Emit the terminal frame sequence: final progress, result, complete.
    ///
    /// The in-flight map and active sub-agent set must be empty by terminal
    /// event time; anything left over is cleared with a warning.
    async fn finish_session(
        &mut self,
        frames: &mpsc::Sender<EventFrame>,
        success: bool,
        usage: Option<crate::types::UsageTotals>,
        error: Option<String>,
    ) -> Result<(), Disconnected> {
        if !self.correlator.is_empty() {
            tracing::warn!(
                session_id = %self.opts.session_id,
                open_tools = ?self.correlator.open_names(),
                "terminal result with unmatched tool calls"
            );
            self.correlator.clear();
        }
        if !self.subagents.is_empty() {
            tracing::warn!(
                session_id = %self.opts.session_id,
                subagents = ?self.subagents.active_names(),
                "terminal result with active sub-agents"
            );
            self.subagents.clear();
        }

        let snapshot = self.phases.mark_completed();
        self.emit(frames, ActivityEvent::Progress { data: snapshot })
            .await?;
        self.emit(
            frames,
            ActivityEvent::Result {
                success,
                usage,
                error,
            },
        )
        .await?;
        self.emit(
            frames,
            ActivityEvent::Complete {
                message_count: self.message_count,
            },
        )
        .await?;
        Ok(())
    }

    async fn emit(
        &self,
        frames: &mpsc::Sender<EventFrame>,
        event: ActivityEvent,
    ) -> Result<(), Disconnected> {
        let frame = EventFrame::new(self.opts.session_id.clone(), event);
        frames.send(frame).await.map_err(|_| {
            tracing::info!(
                session_id = %self.opts.session_id,
                "consumer disconnected; stopping producer"
            );
            Disconnected
        })
    }

    /// Idempotent teardown: stop tracking, clear in-flight state, release the
    /// registry entry. Safe to invoke from any exit path, any number of times.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if !self.correlator.is_empty() {
            tracing::warn!(
                session_id = %self.opts.session_id,
                open_tools = ?self.correlator.open_names(),
                "clearing in-flight tool calls at teardown"
            );
        }
        self.correlator.clear();
        self.subagents.clear();
        self.registry.unregister(&self.opts.session_id);
        tracing::info!(session_id = %self.opts.session_id, "session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;

    fn options() -> SessionOptions {
        SessionOptions::from_config("session-1", &StreamConfig::default())
    }

    #[test]
    fn test_registry_last_writer_wins() {
        let registry = ExecutionRegistry::new();
        registry.register(SessionHandle {
            session_id: "s1".to_string(),
            started_at: Utc::now(),
        });
        registry.register(SessionHandle {
            session_id: "s1".to_string(),
            started_at: Utc::now(),
        });
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("s1"));
    }

    #[test]
    fn test_registry_unregister_absent_is_noop() {
        let registry = ExecutionRegistry::new();
        assert!(!registry.unregister("missing"));
        registry.register(SessionHandle {
            session_id: "s1".to_string(),
            started_at: Utc::now(),
        });
        assert!(registry.unregister("s1"));
        assert!(!registry.unregister("s1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let registry = Arc::new(ExecutionRegistry::new());
        let mut producer = SessionProducer::new(options(), registry.clone());
        registry.register(SessionHandle {
            session_id: "session-1".to_string(),
            started_at: Utc::now(),
        });

        // Simulating a race between complete and disconnect: both invoke
        // teardown, the second must be a no-op.
        producer.teardown();
        assert!(!registry.contains("session-1"));

        registry.register(SessionHandle {
            session_id: "session-1".to_string(),
            started_at: Utc::now(),
        });
        producer.teardown();
        // Second teardown must not release the re-registered entry
        assert!(registry.contains("session-1"));
    }

    #[test]
    fn test_options_from_config() {
        let opts = options();
        assert_eq!(opts.session_id, "session-1");
        assert!(opts.checkpoints_enabled);
        assert_eq!(opts.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(opts.idle_threshold, Duration::from_millis(500));
    }
}
