use super::websocket::WebSocket;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A single HTTP header as a key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An HTTP request to queue through the transport
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<Header>,
    pub body: String,
}

/// The transport's answer to a [`ResourceRequest`].
///
/// Status 499 is reserved for requests cancelled locally before a real
/// response arrived.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
}

impl Response {
    /// A response carrying only a status code.
    pub fn from_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

/// A request to open a WebSocket connection
#[derive(Debug, Clone)]
pub struct WebSocketRequest {
    pub uri: String,
}

/// Idempotent handle that abandons an in-flight transport operation
pub type CancelHandle = Box<dyn FnOnce() + Send>;

/// An in-flight HTTP request: the awaitable response plus a cancel handle.
pub struct ResourceRequestTransaction {
    pub response: BoxFuture<'static, Response>,
    pub cancel: CancelHandle,
}

/// An in-flight WebSocket open: the awaitable handle plus a cancel handle.
///
/// The future resolves to `None` when the open failed or was cancelled.
pub struct WebSocketRequestTransaction {
    pub websocket: BoxFuture<'static, Option<Arc<dyn WebSocket>>>,
    pub cancel: CancelHandle,
}

/// The networking dependencies of the gateway client.
///
/// Both methods queue the operation and return immediately; the returned
/// transaction couples the awaitable result with a cancellation handle so
/// callers can abandon the operation at any time.
pub trait Connections: Send + Sync {
    fn queue_resource_request(&self, request: ResourceRequest) -> ResourceRequestTransaction;

    fn queue_websocket_request(&self, request: WebSocketRequest) -> WebSocketRequestTransaction;
}
