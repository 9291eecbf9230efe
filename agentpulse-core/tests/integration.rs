//! Integration tests for the agentpulse streaming pipeline
//!
//! These tests drive a full producer over channels with scripted runtime
//! messages and assert on the emitted frame sequence and on the consumer
//! state folded from it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use agentpulse_core::config::StreamConfig;
use agentpulse_core::consumer::StreamConsumer;
use agentpulse_core::protocol::{ActivityEvent, EventFrame};
use agentpulse_core::types::{Phase, StreamStatus, ToolStatus};
use agentpulse_core::{
    Error, ExecutionRegistry, RuntimeMessage, SessionOptions, SessionOutcome, SessionProducer,
};

/// Decode a scripted runtime message.
fn msg(value: serde_json::Value) -> Result<RuntimeMessage, Error> {
    Ok(serde_json::from_value(value).expect("valid test message"))
}

/// Run a producer over the scripted messages and collect everything it emits.
async fn run_session(
    messages: Vec<Result<RuntimeMessage, Error>>,
) -> (Vec<EventFrame>, SessionOutcome, Arc<ExecutionRegistry>) {
    let registry = Arc::new(ExecutionRegistry::new());
    let opts = SessionOptions::from_config("it-session", &StreamConfig::default());
    let producer = SessionProducer::new(opts, registry.clone());

    let (msg_tx, msg_rx) = mpsc::channel(64);
    let (frame_tx, mut frame_rx) = mpsc::channel(256);

    let handle = tokio::spawn(producer.run(msg_rx, frame_tx));
    for m in messages {
        msg_tx.send(m).await.expect("producer accepts messages");
    }
    drop(msg_tx);
    let outcome = handle.await.expect("producer task completes");

    let mut frames = Vec::new();
    while let Ok(frame) = frame_rx.try_recv() {
        frames.push(frame);
    }
    (frames, outcome, registry)
}

fn kinds(frames: &[EventFrame]) -> Vec<&'static str> {
    frames.iter().map(|f| f.event.kind()).collect()
}

// ============================================
// End-to-end session flows
// ============================================

#[tokio::test]
async fn test_basic_session_flow() {
    let (frames, outcome, registry) = run_session(vec![
        msg(serde_json::json!({
            "type": "user",
            "uuid": "msg-1",
            "message": {"content": "list files"},
        })),
        msg(serde_json::json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "model": "opus",
                "content": [
                    {"type": "text", "text": "Listing the files."},
                    {"type": "tool_use", "id": "toolu_1", "name": "Glob",
                     "input": {"pattern": "**/*"}},
                ],
            },
        })),
        msg(serde_json::json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "toolu_1",
                 "content": "src/main.rs\nsrc/lib.rs", "is_error": false},
            ]},
        })),
        msg(serde_json::json!({
            "type": "result",
            "is_error": false,
            "usage": {"input_tokens": 100, "output_tokens": 25},
        })),
    ])
    .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert!(registry.is_empty(), "teardown releases the registry entry");

    assert_eq!(
        kinds(&frames),
        vec![
            "connection",
            "checkpoint",
            "message",
            "tool_start",
            "tool_result",
            "progress",
            "checkpoint",
            "progress",
            "result",
            "complete",
        ]
    );

    // The first progress frame reflects the closed Glob call
    let first_progress = frames
        .iter()
        .find_map(|f| match &f.event {
            ActivityEvent::Progress { data } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(first_progress.phase, Phase::GatheringContext);
    assert_eq!(first_progress.completed_tools, 1);
    assert_eq!(first_progress.current_tool.as_deref(), Some("Glob"));

    // Fold everything into the consumer and check the final view
    let mut consumer = StreamConsumer::new(Duration::from_secs(10));
    for frame in frames {
        consumer.handle_frame(frame);
    }
    assert!(consumer.done);
    assert_eq!(consumer.success, Some(true));
    assert_eq!(consumer.message_count, Some(4));
    assert_eq!(consumer.usage.unwrap().input_tokens, 100);
    assert_eq!(consumer.progress.as_ref().unwrap().phase, Phase::Completed);

    assert_eq!(consumer.tool_activities.len(), 1);
    let activity = &consumer.tool_activities[0];
    assert_eq!(activity.name, "Glob");
    assert_eq!(activity.status, ToolStatus::Completed);
    assert_eq!(
        activity.output_preview.as_deref(),
        Some("src/main.rs\nsrc/lib.rs")
    );

    assert_eq!(consumer.checkpoints.len(), 2);
    assert_eq!(consumer.checkpoints[0].preview, "list files");
}

#[tokio::test]
async fn test_subagent_lifecycle() {
    let (frames, outcome, _) = run_session(vec![
        msg(serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "task_1", "name": "Task",
                 "input": {"subagent_type": "Researcher",
                           "description": "Survey prior art"}},
            ]},
        })),
        msg(serde_json::json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "task_1",
                 "content": "findings attached", "is_error": false},
            ]},
        })),
        msg(serde_json::json!({"type": "result", "is_error": false})),
    ])
    .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(
        kinds(&frames),
        vec![
            "connection",
            "message",
            "tool_start",
            "subagent_start",
            "tool_result",
            "subagent_stop",
            "progress",
            "checkpoint",
            "progress",
            "result",
            "complete",
        ]
    );

    let stop = frames
        .iter()
        .find_map(|f| match &f.event {
            ActivityEvent::SubagentStop {
                subagent_name,
                success,
                ..
            } => Some((subagent_name.clone(), *success)),
            _ => None,
        })
        .unwrap();
    assert_eq!(stop, ("Researcher".to_string(), true));

    let mut consumer = StreamConsumer::new(Duration::from_secs(10));
    let mut saw_active = false;
    for frame in frames {
        consumer.handle_frame(frame);
        if !consumer.active_subagents.is_empty() {
            saw_active = true;
        }
    }
    assert!(saw_active, "sub-agent was active mid-session");
    assert!(consumer.active_subagents.is_empty(), "set empty at end");
    assert_eq!(
        consumer.tool_activities[0].subagent_name.as_deref(),
        Some("Researcher")
    );
}

#[tokio::test]
async fn test_runtime_failure_emits_error_frame() {
    let (frames, outcome, registry) = run_session(vec![
        msg(serde_json::json!({
            "type": "user",
            "message": {"content": "do the thing"},
        })),
        Err(Error::Runtime("model backend unavailable".to_string())),
    ])
    .await;

    assert_eq!(outcome, SessionOutcome::Failed);
    assert!(registry.is_empty());
    assert_eq!(kinds(&frames), vec!["connection", "checkpoint", "error"]);

    let mut consumer = StreamConsumer::new(Duration::from_secs(10));
    for frame in frames {
        consumer.handle_frame(frame);
    }
    assert!(consumer.done);
    assert_eq!(consumer.success, Some(false));
    assert!(consumer
        .error
        .as_deref()
        .unwrap()
        .contains("model backend unavailable"));
}

#[tokio::test]
async fn test_consumer_disconnect_tears_down() {
    let registry = Arc::new(ExecutionRegistry::new());
    let opts = SessionOptions::from_config("it-session", &StreamConfig::default());
    let producer = SessionProducer::new(opts, registry.clone());

    let (_msg_tx, msg_rx) = mpsc::channel::<Result<RuntimeMessage, Error>>(8);
    let (frame_tx, frame_rx) = mpsc::channel(8);
    drop(frame_rx);

    let outcome = producer.run(msg_rx, frame_tx).await;
    assert_eq!(outcome, SessionOutcome::Disconnected);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_heartbeat_status_while_idle() {
    let registry = Arc::new(ExecutionRegistry::new());
    let config = StreamConfig {
        heartbeat_interval_ms: 25,
        idle_threshold_ms: 10,
        ..Default::default()
    };
    let opts = SessionOptions::from_config("it-session", &config);
    let producer = SessionProducer::new(opts, registry.clone());

    let (msg_tx, msg_rx) = mpsc::channel::<Result<RuntimeMessage, Error>>(8);
    let (frame_tx, mut frame_rx) = mpsc::channel(64);
    let handle = tokio::spawn(producer.run(msg_rx, frame_tx));

    // No messages are sent; the monitor should synthesize a thinking status
    let status = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = frame_rx.recv().await.expect("producer still running");
            if let ActivityEvent::Status { status, message, .. } = frame.event {
                return (status, message);
            }
        }
    })
    .await
    .expect("a status frame within the timeout");

    assert_eq!(status.0, StreamStatus::Thinking);
    assert_eq!(status.1, "Thinking...");

    drop(msg_tx);
    let outcome = handle.await.unwrap();
    assert_eq!(outcome, SessionOutcome::Completed);
}

#[tokio::test]
async fn test_dangling_result_and_unknown_kinds_tolerated() {
    let (frames, outcome, registry) = run_session(vec![
        msg(serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "toolu_a", "name": "Read",
                 "input": {"file": "x"}},
            ]},
        })),
        // Result for an id that was never started
        msg(serde_json::json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "ghost",
                 "content": "orphaned", "is_error": false},
            ]},
        })),
        // A message kind from a future runtime
        msg(serde_json::json!({"type": "telemetry_burst", "payload": 42})),
        msg(serde_json::json!({"type": "result", "is_error": false})),
    ])
    .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert!(registry.is_empty());

    // The dangling result is dropped: no tool_result frame, no progress bump
    assert!(!kinds(&frames).contains(&"tool_result"));
    let final_progress = frames
        .iter()
        .rev()
        .find_map(|f| match &f.event {
            ActivityEvent::Progress { data } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(final_progress.completed_tools, 0);

    // The unmatched Read start stays open on the consumer side
    let mut consumer = StreamConsumer::new(Duration::from_secs(10));
    for frame in frames {
        consumer.handle_frame(frame);
    }
    assert_eq!(consumer.tool_activities.len(), 1);
    assert_eq!(consumer.open_tools().count(), 1);
}

#[tokio::test]
async fn test_question_request_flow() {
    let (frames, _, _) = run_session(vec![
        msg(serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "q1", "name": "AskUserQuestion",
                 "input": {"question": "Proceed with the migration?"}},
            ]},
        })),
        msg(serde_json::json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "q1",
                 "content": "yes", "is_error": false},
            ]},
        })),
        msg(serde_json::json!({"type": "result", "is_error": false})),
    ])
    .await;

    let mut consumer = StreamConsumer::new(Duration::from_secs(10));
    let mut saw_pending = false;
    for frame in frames {
        consumer.handle_frame(frame);
        if consumer.pending_question.is_some() {
            saw_pending = true;
        }
    }
    assert!(saw_pending, "question was pending before the answer");
    assert!(consumer.pending_question.is_none(), "answer cleared it");
}

#[tokio::test]
async fn test_consumer_run_drains_to_completion() {
    let (frames, _, _) = run_session(vec![
        msg(serde_json::json!({
            "type": "user",
            "message": {"content": "hello"},
        })),
        msg(serde_json::json!({"type": "result", "is_error": false})),
    ])
    .await;

    let (tx, rx) = mpsc::channel(64);
    let consumer_task = tokio::spawn(StreamConsumer::new(Duration::from_secs(10)).run(rx));
    for frame in frames {
        tx.send(frame).await.unwrap();
    }
    drop(tx);

    let consumer = consumer_task.await.unwrap();
    assert!(consumer.done);
    assert_eq!(consumer.success, Some(true));
}
