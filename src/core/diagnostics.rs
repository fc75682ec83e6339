//! Diagnostic record levels and the pre-sink buffer.
//!
//! Records produced before a sink is registered are buffered in order and
//! drained on first registration; records produced afterwards go straight
//! to the sink. Sinks are always invoked outside the serialization lock.

use super::gateway::GatewayInner;
use super::state::SharedDiagnosticSink;
use tracing::{debug, error, info, trace, warn};

pub const LEVEL_TRACE: u8 = 0;
pub const LEVEL_INFO: u8 = 1;
pub const LEVEL_WARN: u8 = 5;
pub const LEVEL_ERROR: u8 = 10;

impl GatewayInner {
    /// Emit one diagnostic record: buffered when no sink is installed,
    /// delivered directly otherwise.
    ///
    /// Must not be called while the state lock is held; handlers collect
    /// records and emit them after releasing it.
    pub(crate) fn diagnostic(&self, level: u8, message: String) {
        match level {
            LEVEL_TRACE => trace!("{message}"),
            LEVEL_INFO => info!("{message}"),
            LEVEL_WARN => warn!("{message}"),
            LEVEL_ERROR => error!("{message}"),
            _ => debug!("{message}"),
        }
        let sink = {
            let mut state = self.state.lock();
            match state.diagnostic_sink.as_ref() {
                Some(sink) => SharedDiagnosticSink::clone(sink),
                None => {
                    state.diagnostic_buffer.push_back((level, message));
                    return;
                }
            }
        };
        sink(level, message);
    }

    /// Install a sink, draining buffered records to it in FIFO order first.
    ///
    /// The sink is published only once the buffer is empty, so records
    /// produced concurrently during the drain keep their place in line
    /// instead of overtaking older buffered ones. Re-registration simply
    /// replaces the sink; nothing is re-drained.
    pub(crate) fn install_diagnostic_sink(&self, sink: SharedDiagnosticSink) {
        loop {
            let batch = {
                let mut state = self.state.lock();
                if state.diagnostic_buffer.is_empty() {
                    state.diagnostic_sink = Some(SharedDiagnosticSink::clone(&sink));
                    return;
                }
                std::mem::take(&mut state.diagnostic_buffer)
            };
            for (level, message) in batch {
                sink(level, message);
            }
        }
    }
}
