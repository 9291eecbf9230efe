//! Checkpoint emission
//!
//! On qualifying human turns, emits a restorable checkpoint marker with a
//! short content preview. Capture is gated by a per-session configuration
//! flag; checkpoints are immutable once created and ordering is append-only.

use chrono::{DateTime, Utc};

use crate::normalize::TurnPreview;
use crate::types::{truncate_chars, SessionCheckpoint, CHECKPOINT_PREVIEW_CHARS};

/// Placeholder preview when a turn carries nothing displayable.
const GENERIC_PREVIEW: &str = "User message";

/// Emits checkpoints for completed human turns.
#[derive(Debug)]
pub struct CheckpointEmitter {
    enabled: bool,
    emitted: usize,
}

impl CheckpointEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, emitted: 0 }
    }

    /// Create a checkpoint for a completed human turn, if capture is enabled.
    ///
    /// Preview extraction prefers the turn's first text block; a turn that is
    /// itself a tool-result turn renders as `Tool result: <id-prefix>`; anything
    /// else falls back to a generic placeholder. `can_rewind` is always true at
    /// creation.
    pub fn on_human_turn(
        &mut self,
        session_id: &str,
        message_uuid: Option<&str>,
        preview: &TurnPreview,
        now: DateTime<Utc>,
    ) -> Option<SessionCheckpoint> {
        if !self.enabled {
            return None;
        }

        let preview = match preview {
            TurnPreview::Text(text) => {
                truncate_chars(text, CHECKPOINT_PREVIEW_CHARS).to_string()
            }
            TurnPreview::ToolResult { id_prefix } => format!("Tool result: {}", id_prefix),
            TurnPreview::Empty => GENERIC_PREVIEW.to_string(),
        };

        self.emitted += 1;

        Some(SessionCheckpoint {
            id: uuid::Uuid::new_v4().to_string(),
            message_uuid: message_uuid
                .map(|u| u.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            session_id: session_id.to_string(),
            timestamp: now,
            preview,
            can_rewind: true,
        })
    }

    /// Number of checkpoints emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}
