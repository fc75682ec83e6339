//! Frame payload definitions and outbound frame encoders

use super::opcodes::OpCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Payload of op 10 (Hello), the server's first frame after the WebSocket
/// opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Client connection properties reported inside Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(rename = "$os")]
    pub os: String,

    #[serde(rename = "$browser")]
    pub browser: String,

    #[serde(rename = "$device")]
    pub device: String,
}

/// Payload of op 2 (Identify), sent once after Hello to authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: IdentifyProperties,
}

impl IdentifyPayload {
    pub fn new(
        token: impl Into<String>,
        os: impl Into<String>,
        browser: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            properties: IdentifyProperties {
                os: os.into(),
                browser: browser.into(),
                device: device.into(),
            },
        }
    }
}

/// Body of the HTTP endpoint discovery response.
///
/// Deserialization fails unless the body is a JSON object carrying a string
/// `url`, which is exactly the validation the connect path needs.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEndpoint {
    pub url: String,
}

/// Encode an op 1 (Heartbeat) frame.
///
/// The `d` field is the last sequence number received from the server, or
/// JSON null when none has been seen on this connection.
pub fn heartbeat_frame(sequence: Option<i64>) -> String {
    json!({ "op": OpCode::Heartbeat, "d": sequence }).to_string()
}

/// Encode an op 2 (Identify) frame.
pub fn identify_frame(payload: &IdentifyPayload) -> String {
    json!({ "op": OpCode::Identify, "d": payload }).to_string()
}
