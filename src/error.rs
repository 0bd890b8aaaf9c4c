use crate::intent::Intent;
use thiserror::Error;

/// Result type for OBS operations
pub type Result<T> = std::result::Result<T, ObsError>;

/// Errors that can occur when talking to an obs-websocket server
#[derive(Error, Debug)]
pub enum ObsError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// The server rejected the Identify message or asked for a password we do not have
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A single request was answered with a failing status
    #[error("{request_type} failed with code {code}: {}", .comment.as_deref().unwrap_or("no comment"))]
    RequestFailed {
        request_type: String,
        code: i64,
        comment: Option<String>,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unexpected response from the server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The controller producing outcomes was shut down or dropped
    #[error("Controller stopped")]
    ControllerStopped,
}

/// Fatal failure of one intent's reconciliation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}: {cause}", .intent.failure_message())]
pub struct ReconcileError {
    pub intent: Intent,
    pub cause: ReconcileCause,
}

/// Why a reconciliation gave up
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileCause {
    /// The read-back never matched within the attempt budget
    #[error("no match after {attempts} attempts (last: {last_observation})")]
    RetriesExhausted {
        attempts: u32,
        last_observation: String,
    },
}

impl ReconcileError {
    pub(crate) fn exhausted(intent: Intent, attempts: u32, last_observation: String) -> Self {
        Self {
            intent,
            cause: ReconcileCause::RetriesExhausted {
                attempts,
                last_observation,
            },
        }
    }
}
