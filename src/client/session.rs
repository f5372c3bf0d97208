//! Client session environment
//!
//! Read-only context every session of the server shares: configuration,
//! account table and the canonical server root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::AccountStore;
use crate::config::ServerConfig;
use crate::error::ServerError;

/// Shared, immutable inputs of a control session.
#[derive(Debug, Clone)]
pub struct SessionEnv {
    config: Arc<ServerConfig>,
    accounts: Arc<AccountStore>,
    server_root: PathBuf,
}

impl SessionEnv {
    /// Resolves the server root. Fails when it does not exist or is not a directory.
    pub async fn new(
        config: Arc<ServerConfig>,
        accounts: Arc<AccountStore>,
    ) -> Result<Self, ServerError> {
        let configured = config.server_root_path();
        let server_root = tokio::fs::canonicalize(&configured).await.map_err(|e| {
            ServerError::SessionSetup(format!(
                "server root {} is unavailable: {e}",
                configured.display()
            ))
        })?;

        let is_dir = matches!(tokio::fs::metadata(&server_root).await, Ok(m) if m.is_dir());
        if !is_dir {
            return Err(ServerError::SessionSetup(format!(
                "server root {} is not a directory",
                server_root.display()
            )));
        }

        Ok(Self {
            config,
            accounts,
            server_root,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Canonical server root; account homes are resolved below it.
    pub fn server_root(&self) -> &Path {
        &self.server_root
    }
}
