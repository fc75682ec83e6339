//! # Gateway dependency seams
//!
//! Core traits and types injected into the gateway client:
//!
//! - **Connections**: queue HTTP and WebSocket requests as cancellable
//!   transactions
//! - **WebSocket**: a live gateway connection from the client's perspective
//! - **GatewayError**: the failure taxonomy of the connect/heartbeat core
//!
//! The gateway never opens sockets itself; everything network-shaped comes
//! in through these traits so hosts (and tests) control the transport.

pub mod connections;
pub mod error;
pub mod websocket;

// Re-export commonly used types
pub use connections::{
    CancelHandle, Connections, Header, ResourceRequest, ResourceRequestTransaction, Response,
    WebSocketRequest, WebSocketRequestTransaction,
};
pub use error::{GatewayError, Result};
pub use websocket::{BinaryCallback, TextCallback, WebSocket, WsCloseCallback};
