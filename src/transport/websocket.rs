//! WebSocket adapter over a tokio-tungstenite stream.
//!
//! One pump task owns the stream: inbound frames fan out to the registered
//! callbacks, outbound frames arrive through an unbounded channel so `text`
//! and `close` stay synchronous for callers on any thread.

use crate::traits::{BinaryCallback, TextCallback, WebSocket, WsCloseCallback};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Close(u16),
}

#[derive(Default)]
struct Callbacks {
    on_text: Mutex<Option<Arc<dyn Fn(String) + Send + Sync>>>,
    on_binary: Mutex<Option<Arc<dyn Fn(Vec<u8>) + Send + Sync>>>,
    on_close: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

/// A live gateway WebSocket backed by tokio-tungstenite.
pub struct TungsteniteWebSocket {
    outbound: UnboundedSender<Outbound>,
    callbacks: Arc<Callbacks>,
}

impl TungsteniteWebSocket {
    /// Take ownership of a connected stream and start its pump task.
    pub fn adopt(stream: WsStream) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = unbounded_channel();
        let callbacks = Arc::new(Callbacks::default());
        let pump_callbacks = Arc::clone(&callbacks);
        tokio::spawn(async move {
            pump(stream, outbound_rx, pump_callbacks).await;
        });
        Arc::new(Self {
            outbound: outbound_tx,
            callbacks,
        })
    }
}

impl WebSocket for TungsteniteWebSocket {
    fn text(&self, message: String) {
        let _ = self.outbound.send(Outbound::Text(message));
    }

    fn binary(&self, message: Vec<u8>) {
        let _ = self.outbound.send(Outbound::Binary(message));
    }

    fn close(&self, code: u16) {
        let _ = self.outbound.send(Outbound::Close(code));
    }

    fn register_text_callback(&self, on_text: TextCallback) {
        *self.callbacks.on_text.lock() = Some(Arc::from(on_text));
    }

    fn register_binary_callback(&self, on_binary: BinaryCallback) {
        *self.callbacks.on_binary.lock() = Some(Arc::from(on_binary));
    }

    fn register_close_callback(&self, on_close: WsCloseCallback) {
        *self.callbacks.on_close.lock() = Some(Arc::from(on_close));
    }
}

async fn pump(
    stream: WsStream,
    mut outbound: UnboundedReceiver<Outbound>,
    callbacks: Arc<Callbacks>,
) {
    let (mut write, mut read) = stream.split();
    let mut close_reported = false;
    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let on_text = callbacks.on_text.lock().clone();
                        if let Some(on_text) = on_text {
                            on_text(text);
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let on_binary = callbacks.on_binary.lock().clone();
                        if let Some(on_binary) = on_binary {
                            on_binary(data);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        report_close(&callbacks, &mut close_reported);
                        break;
                    }
                    // Ping/pong are answered inside tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!("WebSocket read failed: {error}");
                        report_close(&callbacks, &mut close_reported);
                        break;
                    }
                }
            }
            command = outbound.recv() => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            report_close(&callbacks, &mut close_reported);
                            break;
                        }
                    }
                    Some(Outbound::Binary(data)) => {
                        if write.send(Message::Binary(data)).await.is_err() {
                            report_close(&callbacks, &mut close_reported);
                            break;
                        }
                    }
                    Some(Outbound::Close(code)) => {
                        debug!("sending close frame with code {code}");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        if write.send(Message::Close(Some(frame))).await.is_err() {
                            report_close(&callbacks, &mut close_reported);
                            break;
                        }
                        // Keep reading until the remote answers the close.
                    }
                    // All handles dropped; the connection goes away with them.
                    None => break,
                }
            }
        }
    }
    debug!("WebSocket pump exiting");
}

fn report_close(callbacks: &Callbacks, reported: &mut bool) {
    if *reported {
        return;
    }
    *reported = true;
    let on_close = callbacks.on_close.lock().clone();
    if let Some(on_close) = on_close {
        on_close();
    }
}
