use super::config::Configuration;
use super::diagnostics::{LEVEL_INFO, LEVEL_WARN};
use super::state::{GatewayState, Phase, SharedCloseCallback};
use crate::protocol::{self, GatewayEndpoint, IdentifyPayload};
use crate::timekeeping::Scheduler;
use crate::traits::{
    Connections, GatewayError, Header, ResourceRequest, ResourceRequestTransaction, Response,
    WebSocket, WebSocketRequest, WebSocketRequestTransaction,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Endpoint discovery request target
const DISCOVERY_URI: &str = "https://discordapp.com/api/v6/gateway";

/// Query string appended to the discovered gateway base URL
const WEBSOCKET_QUERY: &str = "/?v=6&encoding=json";

/// Close code for a locally initiated graceful close
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code when the server failed to acknowledge a heartbeat in time
pub const HEARTBEAT_LIVENESS_CLOSURE: u16 = 4000;

/// Status synthesized locally for a cancelled resource request
const STATUS_CANCELLED: u16 = 499;

const STATUS_OK: u16 = 200;

/// How long `disconnect` waits for the transport to report the close
const CLOSE_SETTLE_TIMEOUT: Duration = Duration::from_millis(1000);

/// A recoverable client for the Discord gateway.
///
/// One `Gateway` owns at most one live WebSocket. It discovers the gateway
/// endpoint over HTTP (caching the result across disconnect cycles),
/// performs the Hello/Identify opening handshake, and keeps the session
/// alive with scheduled heartbeats, tearing the connection down with close
/// code 4000 when the server stops acknowledging them.
///
/// All methods are safe to call from any thread. `set_scheduler` must be
/// called before the first `connect`; calls outside the idle phase are
/// ignored.
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

pub(crate) struct GatewayInner {
    pub(crate) state: Mutex<GatewayState>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                state: Mutex::new(GatewayState::new()),
            }),
        }
    }

    /// Install the scheduler that drives heartbeat timing.
    ///
    /// Only honored while idle; call it before the first connect.
    pub fn set_scheduler(&self, scheduler: Arc<Scheduler>) {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Idle {
            warn!("set_scheduler ignored outside the idle phase");
            return;
        }
        if state.heartbeat_token != 0 {
            if let Some(old) = state.scheduler.as_ref() {
                old.cancel(state.heartbeat_token);
            }
            state.heartbeat_token = 0;
        }
        state.scheduler = Some(scheduler);
    }

    /// Make the next connect wait on `gate` before issuing any I/O.
    ///
    /// Overwrites any previously stored, still-unobserved gate.
    pub fn wait_before_connect(&self, gate: impl Future<Output = ()> + Send + 'static) {
        self.inner.state.lock().proceed_gate = Some(Box::pin(gate));
    }

    /// Connect to the gateway.
    ///
    /// The returned future resolves `true` once the opening handshake
    /// completes (Hello received, Identify sent). It resolves `false`
    /// immediately, without I/O, when no scheduler is set, a websocket is
    /// already open, or another connect is in flight; otherwise it resolves
    /// `false` on discovery failure, transport failure, or a concurrent
    /// `disconnect`.
    pub fn connect(
        &self,
        connections: Arc<dyn Connections>,
        configuration: Configuration,
    ) -> impl Future<Output = bool> + Send + 'static {
        let (result_tx, result_rx) = oneshot::channel();
        let precondition = {
            let mut state = self.inner.state.lock();
            if state.scheduler.is_none() {
                Some("no scheduler set")
            } else if state.websocket.is_some() {
                Some("websocket already open")
            } else if state.phase.is_connecting() {
                Some("connect already in flight")
            } else {
                state.disconnect_requested = false;
                state.phase = if state.proceed_gate.is_some() {
                    Phase::AwaitingProceed
                } else if state.cached_endpoint.is_some() {
                    Phase::OpeningWebSocket
                } else {
                    Phase::DiscoveringEndpoint
                };
                None
            }
        };
        match precondition {
            Some(reason) => {
                warn!("connect refused: {}", GatewayError::Precondition(reason));
                let _ = result_tx.send(false);
            }
            None => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let connected = match inner.run_connect(connections, configuration).await {
                        Ok(()) => true,
                        Err(error) => {
                            debug!("connect attempt failed: {error}");
                            inner.finish_failed_connect();
                            false
                        }
                    };
                    let _ = result_tx.send(connected);
                });
            }
        }
        async move { result_rx.await.unwrap_or(false) }
    }

    /// Tear down the connection and poison any in-flight connect.
    ///
    /// Closes an open websocket with code 1000 and waits up to one second
    /// for the transport to report the close (a level 5 diagnostic is
    /// emitted on timeout). On return the heartbeat is unscheduled, the
    /// interval cleared, and the websocket released. Safe in every phase,
    /// including idle.
    pub async fn disconnect(&self) {
        debug!("disconnect requested");
        let (cancel, websocket, close_receiver) = {
            let mut state = self.inner.state.lock();
            state.disconnect_requested = true;
            let websocket = state.websocket.clone();
            if websocket.is_some() && state.phase != Phase::Closed {
                state.phase = Phase::Closing;
            }
            (
                state.cancel_current_op.take(),
                websocket,
                state.close_receiver.take(),
            )
        };
        if let Some(cancel) = cancel {
            cancel();
        }
        if let Some(websocket) = websocket {
            websocket.close(NORMAL_CLOSURE);
            let mut settled = false;
            if let Some(close_receiver) = close_receiver {
                settled = tokio::time::timeout(CLOSE_SETTLE_TIMEOUT, close_receiver)
                    .await
                    .is_ok();
            }
            if !settled {
                let error =
                    GatewayError::CloseSettleTimeout(CLOSE_SETTLE_TIMEOUT.as_millis() as u64);
                self.inner.diagnostic(LEVEL_WARN, error.to_string());
                // The transport never reported the close; take the local
                // close path so close_signal and the callback still fire.
                self.inner.close_current(None);
            }
        }
        let websocket = {
            let mut state = self.inner.state.lock();
            if state.heartbeat_token != 0 {
                if let Some(scheduler) = state.scheduler.as_ref() {
                    scheduler.cancel(state.heartbeat_token);
                }
                state.heartbeat_token = 0;
            }
            state.heartbeat_interval_s = 0.0;
            state.next_heartbeat_time = 0.0;
            state.heartbeat_ack_pending = false;
            state.websocket.take()
        };
        drop(websocket);
    }

    /// Install the close callback.
    ///
    /// Fires exactly once per connection on its first observed close; when
    /// the current connection is already closed it fires once, outside the
    /// serialization lock, before this call returns.
    pub fn register_close_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        let callback: SharedCloseCallback = Arc::new(callback);
        let already_closed = {
            let mut state = self.inner.state.lock();
            state.close_callback = Some(SharedCloseCallback::clone(&callback));
            state.phase == Phase::Closed
        };
        if already_closed {
            callback();
        }
    }

    /// Install the diagnostic sink, draining buffered records to it first.
    pub fn register_diagnostic_message_callback(
        &self,
        callback: impl Fn(u8, String) + Send + Sync + 'static,
    ) {
        self.inner.install_diagnostic_sink(Arc::new(callback));
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayInner {
    async fn run_connect(
        self: &Arc<Self>,
        connections: Arc<dyn Connections>,
        configuration: Configuration,
    ) -> Result<(), GatewayError> {
        // Observe the host's gate before any I/O.
        let gate = { self.state.lock().proceed_gate.take() };
        if let Some(gate) = gate {
            debug!("waiting for proceed gate");
            gate.await;
        }

        // Try the cached endpoint first. A refused open falls back to
        // discovery without invalidating the cache.
        let cached = {
            let state = self.state.lock();
            if state.disconnect_requested {
                return Err(GatewayError::Cancelled);
            }
            state.cached_endpoint.clone()
        };
        let mut websocket = None;
        if let Some(endpoint) = cached {
            self.enter_phase(Phase::OpeningWebSocket)?;
            websocket = self.open_websocket(&connections, &endpoint).await?;
            if websocket.is_none() {
                debug!("cached endpoint refused the WebSocket, rediscovering");
            }
        }

        if websocket.is_none() {
            self.enter_phase(Phase::DiscoveringEndpoint)?;
            let endpoint = self
                .discover_endpoint(&connections, &configuration)
                .await?;
            self.enter_phase(Phase::OpeningWebSocket)?;
            websocket = self.open_websocket(&connections, &endpoint).await?;
        }
        let websocket = websocket.ok_or(GatewayError::Transport)?;

        // Adopt the socket and wait for the server's Hello.
        let hello = self.adopt_websocket(websocket)?;
        if hello.await.is_err() {
            return Err(GatewayError::Cancelled);
        }

        // Identify, prime the heartbeat, report connected.
        {
            let mut state = self.state.lock();
            if state.disconnect_requested || state.phase != Phase::AwaitingHello {
                return Err(GatewayError::Cancelled);
            }
            let websocket = state.websocket.clone().ok_or(GatewayError::Cancelled)?;
            let identify = IdentifyPayload::new(
                configuration.token.as_str(),
                configuration.os.as_str(),
                configuration.browser.as_str(),
                configuration.device.as_str(),
            );
            websocket.text(protocol::identify_frame(&identify));
            self.send_heartbeat_locked(&mut state);
            state.phase = Phase::Connected;
            state.cancel_current_op = None;
        }
        self.diagnostic(LEVEL_INFO, "Connected to Discord".to_string());
        Ok(())
    }

    /// Move to the next connecting phase, honoring the poison flag.
    fn enter_phase(&self, phase: Phase) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.disconnect_requested {
            return Err(GatewayError::Cancelled);
        }
        state.phase = phase;
        Ok(())
    }

    /// Fetch the gateway base URL over HTTP and cache it.
    async fn discover_endpoint(
        &self,
        connections: &Arc<dyn Connections>,
        configuration: &Configuration,
    ) -> Result<String, GatewayError> {
        let ResourceRequestTransaction { response, cancel } =
            connections.queue_resource_request(ResourceRequest {
                method: "GET".into(),
                uri: DISCOVERY_URI.into(),
                headers: vec![Header::new("User-Agent", configuration.user_agent.clone())],
                body: String::new(),
            });
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        {
            let mut state = self.state.lock();
            if state.disconnect_requested {
                drop(state);
                cancel();
                return Err(GatewayError::Cancelled);
            }
            state.cancel_current_op = Some(Box::new(move || {
                cancel();
                let _ = cancel_tx.send(());
            }));
        }
        let response = tokio::select! {
            received = response => received,
            _ = cancel_rx => Response::from_status(STATUS_CANCELLED),
        };
        {
            let mut state = self.state.lock();
            state.cancel_current_op = None;
            if state.disconnect_requested {
                return Err(GatewayError::Cancelled);
            }
        }
        if response.status != STATUS_OK {
            return Err(GatewayError::Discovery(format!(
                "status {}",
                response.status
            )));
        }
        let endpoint: GatewayEndpoint = serde_json::from_str(&response.body)
            .map_err(|error| GatewayError::Discovery(format!("malformed body: {error}")))?;
        {
            let mut state = self.state.lock();
            state.cached_endpoint = Some(endpoint.url.clone());
        }
        info!("discovered gateway endpoint {}", endpoint.url);
        Ok(endpoint.url)
    }

    /// Open a WebSocket against `endpoint`. `Ok(None)` means the transport
    /// refused (or the open was cancelled with no disconnect pending).
    async fn open_websocket(
        &self,
        connections: &Arc<dyn Connections>,
        endpoint: &str,
    ) -> Result<Option<Arc<dyn WebSocket>>, GatewayError> {
        let uri = format!("{endpoint}{WEBSOCKET_QUERY}");
        debug!("opening WebSocket at {uri}");
        let WebSocketRequestTransaction { websocket, cancel } =
            connections.queue_websocket_request(WebSocketRequest { uri });
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        {
            let mut state = self.state.lock();
            if state.disconnect_requested {
                drop(state);
                cancel();
                return Err(GatewayError::Cancelled);
            }
            state.cancel_current_op = Some(Box::new(move || {
                cancel();
                let _ = cancel_tx.send(());
            }));
        }
        let handle = tokio::select! {
            handle = websocket => handle,
            _ = cancel_rx => None,
        };
        let mut state = self.state.lock();
        state.cancel_current_op = None;
        if state.disconnect_requested {
            return Err(GatewayError::Cancelled);
        }
        Ok(handle)
    }

    /// Take ownership of a freshly opened websocket: bump the connection
    /// generation, wire its callbacks through weak back-references, and
    /// return the receiver the Hello handler resolves.
    fn adopt_websocket(
        self: &Arc<Self>,
        websocket: Arc<dyn WebSocket>,
    ) -> Result<oneshot::Receiver<()>, GatewayError> {
        let (hello_tx, hello_rx) = oneshot::channel();
        let (close_tx, close_rx) = oneshot::channel();
        let generation = {
            let mut state = self.state.lock();
            if state.disconnect_requested {
                return Err(GatewayError::Cancelled);
            }
            state.generation = state.generation.wrapping_add(1);
            state.phase = Phase::AwaitingHello;
            state.websocket = Some(Arc::clone(&websocket));
            state.hello_signal = Some(hello_tx);
            state.close_signal = Some(close_tx);
            state.close_receiver = Some(close_rx);
            state.heartbeat_interval_s = 0.0;
            state.heartbeat_ack_pending = false;
            state.next_heartbeat_time = 0.0;
            state.last_sequence_number = 0;
            state.received_sequence_number = false;
            // Dropping the hello sender is how disconnect releases the
            // driver while it waits for the handshake.
            let unblock = Arc::downgrade(self);
            state.cancel_current_op = Some(Box::new(move || {
                if let Some(inner) = unblock.upgrade() {
                    inner.state.lock().hello_signal.take();
                }
            }));
            state.generation
        };

        let on_text = Arc::downgrade(self);
        websocket.register_text_callback(Box::new(move |message| {
            if let Some(inner) = on_text.upgrade() {
                inner.on_text(generation, message);
            }
        }));
        let on_binary = Arc::downgrade(self);
        websocket.register_binary_callback(Box::new(move |message| {
            if let Some(inner) = on_binary.upgrade() {
                inner.on_binary(generation, message);
            }
        }));
        let on_close = Arc::downgrade(self);
        websocket.register_close_callback(Box::new(move || {
            if let Some(inner) = on_close.upgrade() {
                inner.on_websocket_close(generation);
            }
        }));
        Ok(hello_rx)
    }

    pub(crate) fn on_websocket_close(&self, generation: u64) {
        self.close_current(Some(generation));
    }

    /// First observed close of a connection: mark Closed, stop the
    /// heartbeat, notify the host, and release the websocket. Later calls
    /// for the same connection are no-ops.
    pub(crate) fn close_current(&self, expected_generation: Option<u64>) {
        let (callback, signal, websocket) = {
            let mut state = self.state.lock();
            if let Some(generation) = expected_generation {
                if state.generation != generation {
                    return;
                }
            }
            if !matches!(
                state.phase,
                Phase::AwaitingHello | Phase::Connected | Phase::Closing
            ) {
                return;
            }
            state.phase = Phase::Closed;
            if state.heartbeat_token != 0 {
                if let Some(scheduler) = state.scheduler.as_ref() {
                    scheduler.cancel(state.heartbeat_token);
                }
                state.heartbeat_token = 0;
            }
            state.heartbeat_ack_pending = false;
            state.hello_signal.take();
            (
                state.close_callback.clone(),
                state.close_signal.take(),
                state.websocket.take(),
            )
        };
        self.diagnostic(LEVEL_INFO, "Disconnected from Discord".to_string());
        if let Some(callback) = callback {
            callback();
        }
        if let Some(signal) = signal {
            let _ = signal.send(());
        }
        drop(websocket);
    }

    /// Clean up after a connect attempt that did not reach Connected.
    fn finish_failed_connect(&self) {
        let websocket = {
            let mut state = self.state.lock();
            state.cancel_current_op = None;
            state.hello_signal = None;
            if state.phase.is_connecting() {
                state.phase = Phase::Idle;
                state.websocket.take()
            } else {
                None
            }
        };
        drop(websocket);
    }
}
