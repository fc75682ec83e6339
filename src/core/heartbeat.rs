//! Heartbeat engine.
//!
//! From the server's Hello until close: send op 1 at the supplied interval,
//! track op 11 acknowledgements, answer server-initiated op 1 immediately,
//! and close with code 4000 when an acknowledgement never arrives. Exactly
//! one heartbeat is ever scheduled; rescheduling cancels the prior token,
//! and an overdue tick rebases the cadence instead of bursting to catch up.

use super::diagnostics::{LEVEL_INFO, LEVEL_WARN};
use super::gateway::{GatewayInner, HEARTBEAT_LIVENESS_CLOSURE};
use super::state::{GatewayState, Phase};
use crate::protocol::{self, HelloPayload};
use crate::traits::GatewayError;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

impl GatewayInner {
    /// Handle op 10. The first Hello of a connection stores the interval
    /// and releases the awaiting driver; duplicates are dropped.
    pub(crate) fn handle_hello_locked(
        &self,
        state: &mut GatewayState,
        data: Value,
        records: &mut Vec<(u8, String)>,
    ) {
        if state.heartbeat_interval_s != 0.0 {
            debug!("duplicate hello dropped");
            return;
        }
        let hello: HelloPayload = match serde_json::from_value(data) {
            Ok(hello) => hello,
            Err(_) => {
                records.push((
                    LEVEL_WARN,
                    "Received hello without heartbeat interval".to_string(),
                ));
                return;
            }
        };
        state.heartbeat_interval_s = hello.heartbeat_interval as f64 / 1000.0;
        records.push((
            LEVEL_INFO,
            format!("Heartbeat interval: {} ms", hello.heartbeat_interval),
        ));
        if let Some(signal) = state.hello_signal.take() {
            let _ = signal.send(());
        }
    }

    /// Send one heartbeat on the current websocket and line up the next.
    ///
    /// The serialization lock is already held; the websocket send itself
    /// never re-enters the gateway.
    pub(crate) fn send_heartbeat_locked(self: &Arc<Self>, state: &mut GatewayState) {
        let Some(websocket) = state.websocket.clone() else {
            return;
        };
        websocket.text(protocol::heartbeat_frame(state.sequence()));
        state.heartbeat_ack_pending = true;
        self.schedule_next_heartbeat_locked(state);
    }

    fn schedule_next_heartbeat_locked(self: &Arc<Self>, state: &mut GatewayState) {
        let Some(scheduler) = state.scheduler.clone() else {
            return;
        };
        // Until Hello supplies the interval there is no cadence to keep.
        if state.heartbeat_interval_s <= 0.0 {
            return;
        }
        if state.heartbeat_token != 0 {
            scheduler.cancel(state.heartbeat_token);
            state.heartbeat_token = 0;
        }
        let now = scheduler.clock().now();
        state.next_heartbeat_time += state.heartbeat_interval_s;
        if state.next_heartbeat_time <= now {
            // Rebase after a stall rather than bursting to catch up.
            state.next_heartbeat_time = now + state.heartbeat_interval_s;
        }
        let due = state.next_heartbeat_time;

        // The callback races schedule/cancel on the scheduler thread; it
        // reads its own token through this cell once it holds the lock and
        // no-ops if it has been superseded.
        let token_cell = Arc::new(AtomicU64::new(0));
        let fired_cell = Arc::clone(&token_cell);
        let weak = Arc::downgrade(self);
        let token = scheduler.schedule(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_heartbeat_due(&fired_cell);
                }
            }),
            due,
        );
        token_cell.store(token, Ordering::Release);
        state.heartbeat_token = token;
    }

    /// The scheduled heartbeat came due: either the previous one was never
    /// acknowledged (liveness failure, close with 4000) or the next one
    /// goes out.
    fn on_heartbeat_due(self: &Arc<Self>, token_cell: &AtomicU64) {
        let failed = {
            let mut state = self.state.lock();
            let token = token_cell.load(Ordering::Acquire);
            if token == 0 || state.heartbeat_token != token {
                return;
            }
            state.heartbeat_token = 0;
            if state.phase == Phase::Closed || state.websocket.is_none() {
                return;
            }
            if state.heartbeat_ack_pending {
                state.websocket.clone()
            } else {
                self.send_heartbeat_locked(&mut state);
                None
            }
        };
        if let Some(websocket) = failed {
            warn!("{}, closing connection", GatewayError::Liveness);
            websocket.close(HEARTBEAT_LIVENESS_CLOSURE);
            self.close_current(None);
        }
    }
}
