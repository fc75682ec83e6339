use thiserror::Error;

/// Failure taxonomy of the gateway connect/heartbeat core.
///
/// Connect failures surface at the public boundary as a resolved-false
/// future; the variant is logged. Nothing at this layer is retried.
/// Protocol anomalies (unknown opcodes, invalid text, malformed or
/// duplicate Hello) never abort the connection and surface through the
/// diagnostic callback instead of this type.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connect called while busy, already connected, or without a scheduler
    #[error("connect precondition violated: {0}")]
    Precondition(&'static str),

    /// Endpoint discovery returned non-200 or a malformed body
    #[error("gateway endpoint discovery failed: {0}")]
    Discovery(String),

    /// The transport could not deliver a WebSocket handle
    #[error("WebSocket open failed")]
    Transport,

    /// Disconnect requested while the operation was in flight
    #[error("cancelled by disconnect")]
    Cancelled,

    /// A heartbeat went unacknowledged past its deadline
    #[error("heartbeat not acknowledged before the next was due")]
    Liveness,

    /// The WebSocket did not report closed within the settle window
    #[error("WebSocket did not close within {0} ms")]
    CloseSettleTimeout(u64),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
