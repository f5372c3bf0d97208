//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Cannot read account file {path}: {source}")]
    AccountFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("User {0} cannot login")]
    InvalidCredentials(String),

    #[error("Home directory {path} for user {user} is unavailable: {source}")]
    HomeUnavailable {
        user: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Path sandbox errors
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path escapes the sandbox root: {0}")]
    OutsideRoot(PathBuf),

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Not a plain file: {0}")]
    NotAFile(PathBuf),

    #[error("File name not allowed: {0}")]
    InvalidName(String),
}

impl SandboxError {
    /// Reply code used when a command is rejected by the sandbox.
    pub fn reply_code(&self) -> u16 {
        match self {
            SandboxError::InvalidName(_) => 553,
            _ => 550,
        }
    }
}

/// Data transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("No available port in {low}-{high} for data connection")]
    NoPortAvailable { low: u16, high: u16 },

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Passive mode needs an IPv4 address, control connection uses {0}")]
    NotIpv4(IpAddr),

    #[error("Data channel not initialized, use PASV first")]
    NoPassiveTransport,

    #[error("Failed to accept data connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Transfer aborted: {0}")]
    Aborted(#[source] io::Error),

    #[error("Local error in processing: {0}")]
    Local(#[source] io::Error),
}

impl TransferError {
    /// Reply code used when a data operation fails.
    pub fn reply_code(&self) -> u16 {
        match self {
            TransferError::NoPassiveTransport | TransferError::Accept(_) => 425,
            TransferError::Aborted(_) => 426,
            _ => 451,
        }
    }
}

/// Errors raised by the session server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind control socket {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot set up session: {0}")]
    SessionSetup(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_map_to_transport_replies() {
        assert_eq!(TransferError::NoPassiveTransport.reply_code(), 425);
        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(TransferError::Aborted(broken).reply_code(), 426);
        let full = io::Error::other("disk full");
        assert_eq!(TransferError::Local(full).reply_code(), 451);
        assert_eq!(
            TransferError::NoPortAvailable { low: 1, high: 2 }.reply_code(),
            451
        );
    }

    #[test]
    fn sandbox_errors_map_to_path_replies() {
        assert_eq!(SandboxError::NotFound("/x".into()).reply_code(), 550);
        assert_eq!(SandboxError::InvalidName("..".into()).reply_code(), 553);
    }
}
