//! Production transport: [`Connections`] over reqwest and tokio-tungstenite.
//!
//! The gateway core never depends on this module; it is the default
//! implementation hosts hand to `connect` when they are not injecting their
//! own transport.

pub mod websocket;

pub use websocket::TungsteniteWebSocket;

use crate::traits::{
    Connections, Header, ResourceRequest, ResourceRequestTransaction, Response, WebSocket,
    WebSocketRequest, WebSocketRequestTransaction,
};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tracing::warn;

/// Queue HTTP requests through a shared reqwest client and WebSocket opens
/// through tokio-tungstenite.
///
/// Cancellation is local: the cancel handle resolves the pending future
/// (status 499 for resource requests, no handle for WebSocket opens) and
/// abandons the underlying I/O.
pub struct HttpConnections {
    http: reqwest::Client,
}

impl HttpConnections {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl Connections for HttpConnections {
    fn queue_resource_request(&self, request: ResourceRequest) -> ResourceRequestTransaction {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let http = self.http.clone();
        let ResourceRequest {
            method,
            uri,
            headers,
            body,
        } = request;
        let response = async move {
            let method =
                reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::GET);
            let mut builder = http.request(method, &uri);
            for header in &headers {
                builder = builder.header(header.key.as_str(), header.value.as_str());
            }
            if !body.is_empty() {
                builder = builder.body(body);
            }
            let send = builder.send();
            tokio::select! {
                _ = cancel_rx => Response::from_status(499),
                result = send => match result {
                    Ok(response) => {
                        let status = response.status().as_u16();
                        let headers = response
                            .headers()
                            .iter()
                            .map(|(name, value)| {
                                Header::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
                            })
                            .collect();
                        let body = response.text().await.unwrap_or_default();
                        Response {
                            status,
                            headers,
                            body,
                        }
                    }
                    Err(error) => {
                        warn!("resource request to {uri} failed: {error}");
                        Response::from_status(500)
                    }
                },
            }
        }
        .boxed();
        ResourceRequestTransaction {
            response,
            cancel: Box::new(move || {
                let _ = cancel_tx.send(());
            }),
        }
    }

    fn queue_websocket_request(&self, request: WebSocketRequest) -> WebSocketRequestTransaction {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let websocket = async move {
            tokio::select! {
                _ = cancel_rx => None,
                result = connect_async(request.uri.as_str()) => match result {
                    Ok((stream, _)) => {
                        let adapter: Arc<dyn WebSocket> = TungsteniteWebSocket::adopt(stream);
                        Some(adapter)
                    }
                    Err(error) => {
                        warn!("WebSocket open at {} failed: {error}", request.uri);
                        None
                    }
                },
            }
        }
        .boxed();
        WebSocketRequestTransaction {
            websocket,
            cancel: Box::new(move || {
                let _ = cancel_tx.send(());
            }),
        }
    }
}
