//! Account store
//!
//! Loads the flat `username password rootDirectory` table once at startup.
//! The store is never mutated afterwards and is shared read-only by every
//! session.

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AuthError;

/// A single login entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user: String,
    pub password: String,
    pub root_dir: PathBuf,
}

impl Account {
    /// Resolves this account's root against the server root.
    ///
    /// The stored root is always taken relative to `server_root`, so `/`
    /// designates the server root itself.
    pub fn home_in(&self, server_root: &Path) -> PathBuf {
        let relative = self
            .root_dir
            .strip_prefix("/")
            .unwrap_or(self.root_dir.as_path());
        server_root.join(relative)
    }
}

/// Read-only account table.
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: Vec<Account>,
}

impl AccountStore {
    /// Reads and parses the account file at `path`.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let contents = fs::read_to_string(path).map_err(|source| AuthError::AccountFile {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::parse(&contents);
        if store.is_empty() {
            warn!("No accounts in {}; every login will be refused", path.display());
        } else {
            info!("Loaded {} account(s) from {}", store.len(), path.display());
        }
        Ok(store)
    }

    /// Parses account lines. Blank lines and `#` comments are skipped, as are
    /// lines with fewer than three fields.
    pub fn parse(contents: &str) -> Self {
        let mut accounts = Vec::new();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [user, password, root, ..] => accounts.push(Account {
                    user: user.to_string(),
                    password: password.to_string(),
                    root_dir: PathBuf::from(root),
                }),
                _ => warn!("Skipping malformed account line {}", index + 1),
            }
        }

        Self { accounts }
    }

    /// Looks up an account by exact user and password.
    pub fn authenticate(&self, user: &str, password: &str) -> Result<&Account, AuthError> {
        self.accounts
            .iter()
            .find(|a| a.user == user && a.password == password)
            .ok_or_else(|| AuthError::InvalidCredentials(user.to_string()))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
