//! Module `state`
//!
//! Defines the per-connection [`Session`]: authentication progress, the
//! jailed root and working directory, the TYPE hint and the pending passive
//! transport. A session is owned by its control loop and never shared.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::transfer::PassiveTransport;

/// Login progress of a control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    UsernameGiven,
    Authenticated,
}

/// TYPE setting. Recorded only; bytes are never transcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Ascii,
    Binary,
}

/// Represents the state of a connected FTP client.
///
/// `current_path` is always canonical and equal to or below `root`.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    auth_state: AuthState,
    user: Option<String>,
    root: PathBuf,
    current_path: PathBuf,
    transfer_type: TransferType,
    transport: Option<PassiveTransport>,
}

impl Session {
    /// Creates an unauthenticated session rooted at `root`, which must be canonical.
    pub fn new(peer: SocketAddr, root: PathBuf) -> Self {
        Self {
            peer,
            auth_state: AuthState::Unauthenticated,
            user: None,
            current_path: root.clone(),
            root,
            transfer_type: TransferType::Binary,
            transport: None,
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    /// Returns whether the client has successfully logged in.
    pub fn is_authenticated(&self) -> bool {
        self.auth_state == AuthState::Authenticated
    }

    /// Returns the username given with USER, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the jailed root of this session.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the current working directory (a host path inside the root).
    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    /// Returns whether a PASV listener is waiting for its data command.
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    // --------------------
    // State transitions
    // --------------------

    /// USER: records the name and drops any previous login.
    ///
    /// An empty name leaves the session unauthenticated.
    pub fn set_user(&mut self, user: &str) {
        if user.is_empty() {
            self.user = None;
            self.auth_state = AuthState::Unauthenticated;
        } else {
            self.user = Some(user.to_string());
            self.auth_state = AuthState::UsernameGiven;
        }
    }

    /// PASS succeeded: jails the session to `home`, which must be canonical.
    pub fn login(&mut self, home: PathBuf) {
        self.current_path = home.clone();
        self.root = home;
        self.auth_state = AuthState::Authenticated;
    }

    /// Moves the working directory. `path` must already be certified by the sandbox.
    pub fn set_current_path(&mut self, path: PathBuf) {
        debug_assert!(path.starts_with(&self.root));
        self.current_path = path;
    }

    pub fn set_transfer_type(&mut self, transfer_type: TransferType) {
        self.transfer_type = transfer_type;
    }

    /// Installs a new passive transport, returning the one it replaces.
    pub fn replace_transport(&mut self, transport: PassiveTransport) -> Option<PassiveTransport> {
        self.transport.replace(transport)
    }

    /// Hands the pending transport to a data command. Each transport is used once.
    pub fn take_transport(&mut self) -> Option<PassiveTransport> {
        self.transport.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("127.0.0.1:5000".parse().unwrap(), PathBuf::from("/srv"))
    }

    #[test]
    fn starts_unauthenticated_at_root() {
        let s = session();
        assert_eq!(s.auth_state(), AuthState::Unauthenticated);
        assert_eq!(s.current_path(), Path::new("/srv"));
        assert_eq!(s.transfer_type(), TransferType::Binary);
        assert!(!s.has_transport());
    }

    #[test]
    fn user_then_login() {
        let mut s = session();
        s.set_user("alice");
        assert_eq!(s.auth_state(), AuthState::UsernameGiven);
        assert_eq!(s.user(), Some("alice"));

        s.login(PathBuf::from("/srv/alice"));
        assert!(s.is_authenticated());
        assert_eq!(s.root(), Path::new("/srv/alice"));
        assert_eq!(s.current_path(), Path::new("/srv/alice"));
    }

    #[test]
    fn user_clears_existing_login() {
        let mut s = session();
        s.set_user("alice");
        s.login(PathBuf::from("/srv"));
        s.set_user("bob");
        assert_eq!(s.auth_state(), AuthState::UsernameGiven);

        s.set_user("");
        assert_eq!(s.auth_state(), AuthState::Unauthenticated);
        assert_eq!(s.user(), None);
    }
}
