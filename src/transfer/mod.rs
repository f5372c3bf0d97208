//! Transfer module for FTP server
//!
//! Handles the passive-mode data channel lifecycle and the one-shot byte
//! exchanges performed over it.

pub mod file_ops;
pub mod passive;

// Re-export key types and functions
pub use file_ops::DataOp;
pub use passive::{PassiveTransport, ipv4_of, pasv_tuple};
