//! The gateway client core.
//!
//! One `Gateway` owns at most one live WebSocket at a time and is built from
//! four collaborating parts: the connection driver (`gateway`), the
//! heartbeat engine (`heartbeat`), the message dispatcher (`dispatch`), and
//! the diagnostic buffer (`diagnostics`). All of them share a single state
//! record behind one serialization lock (`state`).

pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod gateway;
pub mod heartbeat;
pub mod state;

pub use config::Configuration;
pub use diagnostics::{LEVEL_ERROR, LEVEL_INFO, LEVEL_TRACE, LEVEL_WARN};
pub use gateway::Gateway;
