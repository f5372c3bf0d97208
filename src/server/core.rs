use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::auth::AccountStore;
use crate::client::{ControlSession, SessionEnv};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::protocol::{HandlerRegistry, Reply};
use crate::protocol::responses::SERVICE_UNAVAILABLE;

/// Accepts control connections and runs one independent session task per connection.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    accounts: Arc<AccountStore>,
    handlers: Arc<HandlerRegistry>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: Arc<ServerConfig>,
        accounts: Arc<AccountStore>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("Server bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config,
            accounts,
            handlers: Arc::new(HandlerRegistry::standard()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Never waits on a session; accept errors are logged and skipped.
    pub async fn serve(self) {
        info!(
            "Serving {} with {} account(s), passive ports {}-{}",
            self.config.server_root,
            self.accounts.len(),
            self.config.passive_port_min,
            self.config.passive_port_max
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let config = Arc::clone(&self.config);
                    let accounts = Arc::clone(&self.accounts);
                    let handlers = Arc::clone(&self.handlers);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) = handle_new_client(stream, config, accounts, handlers).await {
                            warn!("Failed to handle client {addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
    }
}

/// Builds the session for a fresh connection and runs it to completion.
///
/// A setup failure is answered with a single 421 before the connection is dropped.
async fn handle_new_client(
    mut stream: TcpStream,
    config: Arc<ServerConfig>,
    accounts: Arc<AccountStore>,
    handlers: Arc<HandlerRegistry>,
) -> Result<(), ServerError> {
    let env = match SessionEnv::new(config, accounts).await {
        Ok(env) => env,
        Err(e) => {
            error!("{e}");
            let reply = Reply::new(SERVICE_UNAVAILABLE, "Internal error, closing control connection.");
            let _ = stream.write_all(reply.to_wire().as_bytes()).await;
            let _ = stream.shutdown().await;
            return Err(e);
        }
    };

    ControlSession::new(stream, env, handlers)?.run().await;
    Ok(())
}
