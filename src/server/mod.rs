//! Server core functionality
//!
//! Owns the control listener and spawns a session per accepted connection.

pub mod core;

pub use core::Server;
