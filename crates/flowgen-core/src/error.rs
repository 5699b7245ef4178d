//! Core error types for flowgen.
//!
//! Each component owns one enum. `SessionError` wraps the others where a
//! failure crosses into the session driver.

/// Failure of a single capability-bridge call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The name is not part of the closed capability registry.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// The bridge process could not be started.
    #[error("Failed to spawn bridge process: {0}")]
    Spawn(String),

    /// Writing the request or collecting the output failed.
    #[error("Bridge I/O error: {0}")]
    Io(String),

    /// The bridge process exited non-zero. Carries trimmed stderr.
    #[error("Bridge process failed: {0}")]
    ProcessFailed(String),

    /// The last output line was not a JSON-RPC response.
    #[error("Bridge protocol violation: {0}")]
    ProtocolViolation(String),

    /// The registry reported a business-logic failure.
    #[error("Tool error: {0}")]
    ToolError(String),
}

impl BridgeError {
    /// Transport failures are fatal for whoever issued the call; the rest
    /// describe a response that did arrive.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Spawn(_) | BridgeError::Io(_))
    }
}

/// Failure of the artifact finalizer.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("Artifact is empty")]
    Empty,

    #[error("Failed to write artifact to '{path}': {message}")]
    Write { path: String, message: String },
}

/// Failure while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: String, message: String },
}

/// Failure of an agent session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The reasoning process could not be started or its stream dropped.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The reasoning process reported an error as its terminal event.
    #[error("Reasoning process error: {0}")]
    Reasoning(String),

    /// An operation was attempted in a state that does not allow it.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// An approval left out fields the permission request asked for.
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// Saving or loading a resume state failed.
    #[error("Resume state error: {0}")]
    Resume(String),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

impl SessionError {
    /// Failures a UI should show as "could not reach the reasoning process".
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}
