//! Flowgen Core: orchestration for an autonomous workflow-generation agent.
//!
//! A session drives an external reasoning process (a Claude Code style CLI
//! speaking stream-json), declares the capability bridge as its tool
//! surface, interprets the streamed events and commits the generated
//! workflow to disk byte-for-byte.
//!
//! - `bridge`: per-call subprocess JSON-RPC client over a closed registry
//! - `dialect`: read-only parser for the flow dialect
//! - `session`: payload, process launch and the session state machine
//! - `interpreter`: stream decoding, task list and tool-call bookkeeping
//! - `finalizer`: artifact cleanup and persistence
//! - `trace`: JSONL session traces

pub mod bridge;
pub mod config;
pub mod dialect;
pub mod error;
pub mod finalizer;
pub mod interpreter;
pub mod session;
pub mod trace;

// Convenience re-exports
pub use bridge::CapabilityBridge;
pub use config::FlowgenConfig;
pub use error::{BridgeError, ConfigError, FinalizeError, SessionError};
pub use finalizer::{ArtifactFinalizer, ArtifactText, FinalizedArtifact};
pub use session::{SessionDriver, SessionOutcome};
