//! Shared mocks and fixture for the gateway integration tests.
#![allow(dead_code)] // not every test binary exercises every helper
//!
//! `MockConnections` records every queued request and lets the test resolve
//! or cancel it by hand; `MockWebSocket` records outbound frames and lets
//! the test inject inbound ones; `MockClock` only moves when told to, with
//! `Scheduler::wake_up` pushing the worker to re-read it.

use crossbeam_channel::{unbounded, Receiver, Sender};
use discord_gateway::timekeeping::{Clock, Scheduler};
use discord_gateway::traits::{
    BinaryCallback, Connections, ResourceRequest, ResourceRequestTransaction, Response,
    TextCallback, WebSocket, WebSocketRequest, WebSocketRequestTransaction, WsCloseCallback,
};
use discord_gateway::{Configuration, Gateway};
use parking_lot::Mutex;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Opt-in test logging: set TEST_VERBOSE to see the gateway's tracing
/// output interleaved with the test steps.
fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if std::env::var("TEST_VERBOSE").is_ok() {
            let _ = tracing_subscriber::fmt().with_target(false).try_init();
        }
    });
}

/// How long to wait for an expected asynchronous step
pub const STEP_TIMEOUT: Duration = Duration::from_millis(100);

/// How long to wait when asserting outbound frames
pub const SETTLE_TIMEOUT: Duration = Duration::from_millis(200);

pub const HEARTBEAT_INTERVAL_MS: u64 = 45_000;

fn wait_until(signal: &Receiver<()>, deadline: Instant, predicate: impl Fn() -> bool) -> bool {
    loop {
        if predicate() {
            return true;
        }
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return predicate();
        };
        let _ = signal.recv_timeout(remaining);
        if Instant::now() >= deadline {
            return predicate();
        }
    }
}

// ---------------------------------------------------------------------------
// MockWebSocket
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockWebSocketInner {
    closed: bool,
    close_code: u16,
    texts_sent: Vec<String>,
    on_text: Option<Arc<dyn Fn(String) + Send + Sync>>,
    on_binary: Option<Arc<dyn Fn(Vec<u8>) + Send + Sync>>,
    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
}

pub struct MockWebSocket {
    inner: Mutex<MockWebSocketInner>,
    text_signal: (Sender<()>, Receiver<()>),
}

impl MockWebSocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockWebSocketInner::default()),
            text_signal: unbounded(),
        })
    }

    /// Wait until at least `count` text frames have been sent.
    pub fn await_texts(&self, count: usize) -> bool {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        wait_until(&self.text_signal.1, deadline, || {
            self.inner.lock().texts_sent.len() >= count
        })
    }

    /// Wait until the gateway has registered its text callback.
    pub fn await_text_callback(&self) -> bool {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        while Instant::now() < deadline {
            if self.inner.lock().on_text.is_some() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.inner.lock().on_text.is_some()
    }

    pub fn texts_sent(&self) -> Vec<String> {
        self.inner.lock().texts_sent.clone()
    }

    pub fn clear_texts(&self) {
        self.inner.lock().texts_sent.clear();
    }

    pub fn closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn close_code(&self) -> u16 {
        self.inner.lock().close_code
    }

    /// Deliver an inbound text frame to the gateway.
    pub fn receive_text(&self, message: impl Into<String>) {
        let on_text = self.inner.lock().on_text.clone();
        if let Some(on_text) = on_text {
            on_text(message.into());
        }
    }

    /// Simulate the remote side closing the connection.
    pub fn remote_close(&self) {
        let on_close = self.inner.lock().on_close.clone();
        if let Some(on_close) = on_close {
            on_close();
        }
    }

    /// Forget callbacks and recorded traffic so the same mock can serve the
    /// next connection.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.closed = false;
        inner.close_code = 0;
        inner.texts_sent.clear();
        inner.on_text = None;
        inner.on_binary = None;
        inner.on_close = None;
    }
}

impl WebSocket for MockWebSocket {
    fn text(&self, message: String) {
        self.inner.lock().texts_sent.push(message);
        let _ = self.text_signal.0.send(());
    }

    fn binary(&self, _message: Vec<u8>) {}

    fn close(&self, code: u16) {
        let on_close = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.close_code = code;
            inner.on_close.clone()
        };
        if let Some(on_close) = on_close {
            on_close();
        }
    }

    fn register_text_callback(&self, on_text: TextCallback) {
        self.inner.lock().on_text = Some(Arc::from(on_text));
    }

    fn register_binary_callback(&self, on_binary: BinaryCallback) {
        self.inner.lock().on_binary = Some(Arc::from(on_binary));
    }

    fn register_close_callback(&self, on_close: WsCloseCallback) {
        self.inner.lock().on_close = Some(Arc::from(on_close));
    }
}

// ---------------------------------------------------------------------------
// MockConnections
// ---------------------------------------------------------------------------

pub struct RecordedResourceRequest {
    pub request: ResourceRequest,
    responder: Arc<Mutex<Option<oneshot::Sender<Response>>>>,
    canceled: Arc<AtomicBool>,
}

pub struct RecordedWebSocketRequest {
    pub request: WebSocketRequest,
    responder: Arc<Mutex<Option<oneshot::Sender<Option<Arc<dyn WebSocket>>>>>>,
    canceled: Arc<AtomicBool>,
}

pub struct MockConnections {
    resource_requests: Mutex<Vec<RecordedResourceRequest>>,
    websocket_requests: Mutex<Vec<RecordedWebSocketRequest>>,
    resource_signal: (Sender<()>, Receiver<()>),
    websocket_signal: (Sender<()>, Receiver<()>),
    cancel_signal: (Sender<()>, Receiver<()>),
}

impl MockConnections {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            resource_requests: Mutex::new(Vec::new()),
            websocket_requests: Mutex::new(Vec::new()),
            resource_signal: unbounded(),
            websocket_signal: unbounded(),
            cancel_signal: unbounded(),
        })
    }

    pub fn resource_request_count(&self) -> usize {
        self.resource_requests.lock().len()
    }

    pub fn websocket_request_count(&self) -> usize {
        self.websocket_requests.lock().len()
    }

    pub fn resource_request(&self, index: usize) -> ResourceRequest {
        self.resource_requests.lock()[index].request.clone()
    }

    pub fn websocket_request_uri(&self, index: usize) -> String {
        self.websocket_requests.lock()[index].request.uri.clone()
    }

    /// Wait until at least `count` resource requests have been queued.
    pub fn require_resource_requests(&self, count: usize) -> bool {
        let deadline = Instant::now() + STEP_TIMEOUT;
        wait_until(&self.resource_signal.1, deadline, || {
            self.resource_request_count() >= count
        })
    }

    /// Wait until at least `count` websocket requests have been queued.
    pub fn require_websocket_requests(&self, count: usize) -> bool {
        let deadline = Instant::now() + STEP_TIMEOUT;
        wait_until(&self.websocket_signal.1, deadline, || {
            self.websocket_request_count() >= count
        })
    }

    pub fn respond_to_resource_request(&self, index: usize, response: Response) {
        let responder = self.resource_requests.lock()[index].responder.lock().take();
        if let Some(responder) = responder {
            let _ = responder.send(response);
        }
    }

    pub fn respond_to_websocket_request(
        &self,
        index: usize,
        websocket: Option<Arc<dyn WebSocket>>,
    ) {
        let responder = self.websocket_requests.lock()[index]
            .responder
            .lock()
            .take();
        if let Some(responder) = responder {
            let _ = responder.send(websocket);
        }
    }

    pub fn resource_request_canceled(&self, index: usize) -> bool {
        self.resource_requests.lock()[index]
            .canceled
            .load(Ordering::SeqCst)
    }

    /// Wait for the cancel handle of the given resource request to run.
    pub fn await_resource_cancel(&self, index: usize) -> bool {
        let deadline = Instant::now() + STEP_TIMEOUT;
        wait_until(&self.cancel_signal.1, deadline, || {
            self.resource_request_canceled(index)
        })
    }
}

impl Connections for MockConnections {
    fn queue_resource_request(&self, request: ResourceRequest) -> ResourceRequestTransaction {
        let (response_tx, response_rx) = oneshot::channel();
        let responder = Arc::new(Mutex::new(Some(response_tx)));
        let canceled = Arc::new(AtomicBool::new(false));
        self.resource_requests.lock().push(RecordedResourceRequest {
            request,
            responder: Arc::clone(&responder),
            canceled: Arc::clone(&canceled),
        });
        let _ = self.resource_signal.0.send(());
        let cancel_signal = self.cancel_signal.0.clone();
        ResourceRequestTransaction {
            response: Box::pin(async move {
                response_rx.await.unwrap_or(Response::from_status(500))
            }),
            cancel: Box::new(move || {
                canceled.store(true, Ordering::SeqCst);
                if let Some(responder) = responder.lock().take() {
                    let _ = responder.send(Response::from_status(499));
                }
                let _ = cancel_signal.send(());
            }),
        }
    }

    fn queue_websocket_request(&self, request: WebSocketRequest) -> WebSocketRequestTransaction {
        let (response_tx, response_rx) = oneshot::channel();
        let responder = Arc::new(Mutex::new(Some(response_tx)));
        let canceled = Arc::new(AtomicBool::new(false));
        self.websocket_requests
            .lock()
            .push(RecordedWebSocketRequest {
                request,
                responder: Arc::clone(&responder),
                canceled: Arc::clone(&canceled),
            });
        let _ = self.websocket_signal.0.send(());
        let cancel_signal = self.cancel_signal.0.clone();
        WebSocketRequestTransaction {
            websocket: Box::pin(async move { response_rx.await.unwrap_or(None) }),
            cancel: Box::new(move || {
                canceled.store(true, Ordering::SeqCst);
                if let Some(responder) = responder.lock().take() {
                    let _ = responder.send(None);
                }
                let _ = cancel_signal.send(());
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MockClock
// ---------------------------------------------------------------------------

pub struct MockClock {
    time: Mutex<f64>,
}

impl MockClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            time: Mutex::new(0.0),
        })
    }

    pub fn advance(&self, delta: f64) {
        *self.time.lock() += delta;
    }
}

impl Clock for MockClock {
    fn now(&self) -> f64 {
        *self.time.lock()
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// One gateway under test wired to mock transports and a mock clock.
pub struct Fixture {
    pub gateway: Gateway,
    pub connections: Arc<MockConnections>,
    pub websocket: Arc<MockWebSocket>,
    pub clock: Arc<MockClock>,
    pub scheduler: Arc<Scheduler>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let clock = MockClock::new();
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&clock) as Arc<dyn Clock>));
        let gateway = Gateway::new();
        gateway.set_scheduler(Arc::clone(&scheduler));
        Self {
            gateway,
            connections: MockConnections::new(),
            websocket: MockWebSocket::new(),
            clock,
            scheduler,
        }
    }

    pub fn configuration() -> Configuration {
        Configuration {
            token: "token123".into(),
            os: "linux".into(),
            browser: "discord-gateway".into(),
            device: "server".into(),
            user_agent: "DiscordBot".into(),
        }
    }

    pub fn connections(&self) -> Arc<dyn Connections> {
        Arc::clone(&self.connections) as Arc<dyn Connections>
    }

    pub fn start_connect(&self) -> impl Future<Output = bool> + Send + 'static {
        self.gateway.connect(self.connections(), Self::configuration())
    }

    pub fn send_hello(&self) {
        self.websocket.receive_text(
            json!({ "op": 10, "d": { "heartbeat_interval": HEARTBEAT_INTERVAL_MS } }).to_string(),
        );
    }

    pub fn send_heartbeat_ack(&self) {
        self.websocket.receive_text(json!({ "op": 11 }).to_string());
    }

    /// Drive a connect through discovery and the websocket open, stopping
    /// right before Hello. Returns the still-pending connect future.
    pub fn open_websocket(&self) -> impl Future<Output = bool> + Send + 'static {
        self.open_websocket_at("wss://gateway.discord.gg")
    }

    pub fn open_websocket_at(&self, endpoint: &str) -> impl Future<Output = bool> + Send + 'static {
        let next_resource = self.connections.resource_request_count();
        let next_websocket = self.connections.websocket_request_count();
        let connected = self.start_connect();
        assert!(self.connections.require_resource_requests(next_resource + 1));
        self.connections.respond_to_resource_request(
            next_resource,
            Response {
                status: 200,
                headers: Vec::new(),
                body: json!({ "url": endpoint }).to_string(),
            },
        );
        assert!(self.connections.require_websocket_requests(next_websocket + 1));
        self.connections.respond_to_websocket_request(
            next_websocket,
            Some(Arc::clone(&self.websocket) as Arc<dyn WebSocket>),
        );
        assert!(self.websocket.await_text_callback());
        connected
    }

    /// Full successful connect: discovery, websocket open, Hello.
    pub async fn connect(&self) -> bool {
        let connected = self.open_websocket();
        self.send_hello();
        tokio::time::timeout(STEP_TIMEOUT, connected)
            .await
            .unwrap_or(false)
    }

    /// Reconnect against the cached endpoint (no discovery leg expected).
    pub async fn reconnect(&self) -> bool {
        self.websocket.reset();
        let next_websocket = self.connections.websocket_request_count();
        let connected = self.start_connect();
        assert!(self.connections.require_websocket_requests(next_websocket + 1));
        self.connections.respond_to_websocket_request(
            next_websocket,
            Some(Arc::clone(&self.websocket) as Arc<dyn WebSocket>),
        );
        assert!(self.websocket.await_text_callback());
        self.send_hello();
        tokio::time::timeout(STEP_TIMEOUT, connected)
            .await
            .unwrap_or(false)
    }
}
