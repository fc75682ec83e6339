//! # discord-gateway
//!
//! A recoverable client for the Discord gateway control plane.
//!
//! ## Features
//!
//! - **Endpoint discovery with caching**: one HTTP lookup, reused across
//!   disconnect cycles; a refused cached open falls back to rediscovery
//!   without dropping the cache
//! - **Opening handshake**: Hello → Identify, with the connect future
//!   resolving only once the session is live
//! - **Heartbeat liveness**: scheduled op 1 heartbeats, op 11 ack tracking,
//!   close(4000) on a missed acknowledgement
//! - **Prompt cancellation**: `disconnect` unblocks any in-flight discovery,
//!   open, or handshake wait
//! - **Injected transports and time**: the HTTP/WebSocket layer and the
//!   clock behind the scheduler are trait objects, so tests run against
//!   mocks and hand-cranked clocks
//!
//! ## Example
//!
//! ```rust,ignore
//! use discord_gateway::{Configuration, Gateway, Scheduler, SystemClock};
//! use discord_gateway::transport::HttpConnections;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = Gateway::new();
//!     gateway.set_scheduler(Arc::new(Scheduler::new(Arc::new(SystemClock))));
//!     gateway.register_close_callback(|| println!("closed"));
//!
//!     let connected = gateway
//!         .connect(
//!             Arc::new(HttpConnections::new()),
//!             Configuration {
//!                 token: "Bot …".into(),
//!                 os: "linux".into(),
//!                 browser: "discord-gateway".into(),
//!                 device: "server".into(),
//!                 user_agent: "DiscordBot (discord-gateway, 0.1)".into(),
//!             },
//!         )
//!         .await;
//!     assert!(connected);
//! }
//! ```

pub mod core;
pub mod protocol;
pub mod timekeeping;
pub mod traits;
pub mod transport;

// Re-export the public surface
pub use crate::core::{Configuration, Gateway, LEVEL_ERROR, LEVEL_INFO, LEVEL_TRACE, LEVEL_WARN};
pub use crate::timekeeping::{Clock, Scheduler, SystemClock};
pub use crate::traits::{
    Connections, GatewayError, Header, ResourceRequest, ResourceRequestTransaction, Response,
    WebSocket, WebSocketRequest, WebSocketRequestTransaction,
};

/// Result type alias using [`GatewayError`]
pub type Result<T> = std::result::Result<T, GatewayError>;
