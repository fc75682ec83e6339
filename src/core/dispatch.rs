//! Inbound frame dispatcher.
//!
//! Text frames are decoded as JSON and routed by the integer `op` field;
//! anything that is not a JSON object is reported and dropped. Binary
//! frames are accepted but carry nothing at this layer.

use super::diagnostics::{LEVEL_ERROR, LEVEL_TRACE, LEVEL_WARN};
use super::gateway::GatewayInner;
use crate::protocol::OpCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

impl GatewayInner {
    pub(crate) fn on_text(self: &Arc<Self>, generation: u64, message: String) {
        let root: Option<Value> = serde_json::from_str(&message).ok();
        let object = match root.as_ref().and_then(Value::as_object) {
            Some(object) => object,
            None => {
                self.diagnostic(LEVEL_ERROR, format!("Invalid text received: {message}"));
                return;
            }
        };
        self.diagnostic(LEVEL_TRACE, message.clone());

        let mut records: Vec<(u8, String)> = Vec::new();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                // A frame from a connection that has since been replaced.
                return;
            }
            if let Some(sequence) = object.get("s").and_then(Value::as_i64) {
                state.last_sequence_number = sequence;
                state.received_sequence_number = true;
            }
            let op = object.get("op").and_then(Value::as_i64);
            match op.and_then(OpCode::from_i64) {
                Some(OpCode::Heartbeat) => {
                    // The server wants a heartbeat right now.
                    self.send_heartbeat_locked(&mut state);
                }
                Some(OpCode::Hello) => {
                    let data = object.get("d").cloned().unwrap_or(Value::Null);
                    self.handle_hello_locked(&mut state, data, &mut records);
                }
                Some(OpCode::HeartbeatAck) => {
                    state.heartbeat_ack_pending = false;
                    records.push((LEVEL_TRACE, "Heartbeat ACK received".to_string()));
                }
                Some(OpCode::Identify) | None => {
                    let shown = op.map_or_else(|| "none".to_string(), |op| op.to_string());
                    records.push((
                        LEVEL_WARN,
                        format!("Received message with unknown opcode {shown}"),
                    ));
                }
            }
        }
        for (level, record) in records {
            self.diagnostic(level, record);
        }
    }

    pub(crate) fn on_binary(&self, _generation: u64, message: Vec<u8>) {
        trace!("ignoring {}-byte binary frame", message.len());
    }
}
