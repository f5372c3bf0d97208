//! Client session management
//!
//! Per-connection state, control connection I/O and the command loop.

pub mod control;
pub mod handler;
pub mod session;
pub mod state;

pub use control::{ControlChannel, Line};
pub use handler::ControlSession;
pub use session::SessionEnv;
pub use state::{AuthState, Session, TransferType};
