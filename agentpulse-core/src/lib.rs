//! # agentpulse-core
//!
//! Core library for agentpulse - live observation of AI agent sessions.
//!
//! This library provides:
//! - Normalization of raw agent-runtime messages into canonical facts
//! - Tool-call correlation, sub-agent tracking, and phase inference
//! - A producer that emits one ordered stream of tagged event frames
//! - A consumer-side reducer that folds frames into renderable view state
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Events flow one way through the pipeline:
//! - **Producer:** raw runtime messages are normalized, correlated, and
//!   enriched (phase, checkpoints, heartbeat statuses), then framed onto a
//!   single ordered channel
//! - **Wire:** newline-delimited JSON frames, strict emission order
//! - **Consumer:** a pure reducer folds frames into view state; unknown
//!   frame kinds are ignored for forward compatibility
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentpulse_core::{Config, ExecutionRegistry, SessionOptions, SessionProducer};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let registry = Arc::new(ExecutionRegistry::new());
//! let opts = SessionOptions::from_config("session-1", &config.stream);
//! let producer = SessionProducer::new(opts, registry);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use consumer::StreamConsumer;
pub use error::{Error, Result};
pub use normalize::RuntimeMessage;
pub use protocol::{ActivityEvent, EventFrame};
pub use session::{ExecutionRegistry, SessionOptions, SessionOutcome, SessionProducer};
pub use types::*;

// Public modules
pub mod checkpoint;
pub mod config;
pub mod consumer;
pub mod correlate;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod normalize;
pub mod phase;
pub mod protocol;
pub mod session;
pub mod subagent;
pub mod types;
