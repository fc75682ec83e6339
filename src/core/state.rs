use crate::timekeeping::Scheduler;
use crate::traits::connections::CancelHandle;
use crate::traits::WebSocket;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Connection lifecycle phase.
///
/// `Closed` is not terminal for the client; a later connect re-arms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingProceed,
    DiscoveringEndpoint,
    OpeningWebSocket,
    AwaitingHello,
    Connected,
    Closing,
    Closed,
}

impl Phase {
    /// True while a connect attempt is in flight.
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            Phase::AwaitingProceed
                | Phase::DiscoveringEndpoint
                | Phase::OpeningWebSocket
                | Phase::AwaitingHello
        )
    }
}

/// Sink installed by the host for diagnostic records
pub(crate) type SharedDiagnosticSink = Arc<dyn Fn(u8, String) + Send + Sync>;

/// Host callback fired on the first observed close of a connection
pub(crate) type SharedCloseCallback = Arc<dyn Fn() + Send + Sync>;

/// All mutable gateway state, guarded by the single serialization lock.
///
/// The lock is never held across an await and never held while invoking
/// host-supplied callbacks; driver code re-reads `disconnect_requested`
/// every time it re-acquires the lock.
pub(crate) struct GatewayState {
    pub phase: Phase,

    /// Monotonic counter bumped each time a WebSocket is adopted; transport
    /// and scheduler callbacks from older connections compare against it
    /// and no-op when stale.
    pub generation: u64,

    /// Last successfully discovered gateway base URL. Survives disconnects
    /// and failed opens; only a successful rediscovery overwrites it.
    pub cached_endpoint: Option<String>,

    pub websocket: Option<Arc<dyn WebSocket>>,

    /// Cancels the in-flight transport operation, present exactly while one
    /// is outstanding. `disconnect` takes and runs it outside the lock.
    pub cancel_current_op: Option<CancelHandle>,

    /// One-shot the next connect must observe before issuing any I/O
    pub proceed_gate: Option<BoxFuture<'static, ()>>,

    /// Sticky teardown flag, cleared at connect entry
    pub disconnect_requested: bool,

    /// Server-supplied heartbeat interval in seconds; 0 until Hello arrives
    pub heartbeat_interval_s: f64,

    /// Clock time the next heartbeat is due
    pub next_heartbeat_time: f64,

    /// Scheduler token of the pending heartbeat callback; 0 when none
    pub heartbeat_token: u64,

    /// True between sending a heartbeat and receiving its op 11 ack
    pub heartbeat_ack_pending: bool,

    pub last_sequence_number: i64,
    pub received_sequence_number: bool,

    /// Resolved by the Hello handler to release the awaiting driver
    pub hello_signal: Option<oneshot::Sender<()>>,

    /// Fired when the current connection observes close
    pub close_signal: Option<oneshot::Sender<()>>,
    /// Taken by `disconnect` to wait for the close to settle
    pub close_receiver: Option<oneshot::Receiver<()>>,

    pub diagnostic_sink: Option<SharedDiagnosticSink>,
    pub diagnostic_buffer: VecDeque<(u8, String)>,

    pub close_callback: Option<SharedCloseCallback>,

    pub scheduler: Option<Arc<Scheduler>>,
}

impl GatewayState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
            cached_endpoint: None,
            websocket: None,
            cancel_current_op: None,
            proceed_gate: None,
            disconnect_requested: false,
            heartbeat_interval_s: 0.0,
            next_heartbeat_time: 0.0,
            heartbeat_token: 0,
            heartbeat_ack_pending: false,
            last_sequence_number: 0,
            received_sequence_number: false,
            hello_signal: None,
            close_signal: None,
            close_receiver: None,
            diagnostic_sink: None,
            diagnostic_buffer: VecDeque::new(),
            close_callback: None,
            scheduler: None,
        }
    }

    /// Latest server sequence, or None while nothing has been received.
    pub fn sequence(&self) -> Option<i64> {
        if self.received_sequence_number {
            Some(self.last_sequence_number)
        } else {
            None
        }
    }
}
