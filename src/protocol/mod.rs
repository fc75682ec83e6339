//! Gateway wire protocol: opcodes and frame payloads.
//!
//! Every gateway frame is a JSON object tagged with an integer `op`. This
//! module defines the opcodes the client speaks plus the payload shapes and
//! encoders for the outbound frames.

pub mod opcodes;
pub mod payloads;

pub use opcodes::OpCode;
pub use payloads::{
    heartbeat_frame, identify_frame, GatewayEndpoint, HelloPayload, IdentifyPayload,
    IdentifyProperties,
};
