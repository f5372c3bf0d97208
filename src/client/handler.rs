//! Control session loop
//!
//! Drives one control connection: greets the client, reads command lines,
//! enforces login gating and dispatches to the registered handlers. Commands
//! are processed strictly one after another.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;

use crate::client::control::{ControlChannel, Line};
use crate::client::session::SessionEnv;
use crate::client::state::Session;
use crate::error::ServerError;
use crate::protocol::responses::*;
use crate::protocol::{CommandContext, CommandLine, CommandResult, CommandStatus, HandlerRegistry, parse_command};

/// One client's control connection together with its session state.
pub struct ControlSession {
    control: ControlChannel,
    session: Session,
    env: SessionEnv,
    handlers: Arc<HandlerRegistry>,
}

impl ControlSession {
    pub fn new(
        stream: TcpStream,
        env: SessionEnv,
        handlers: Arc<HandlerRegistry>,
    ) -> Result<Self, ServerError> {
        let control = ControlChannel::new(stream, env.config().max_command_length)?;
        let session = Session::new(control.peer(), env.server_root().to_path_buf());

        Ok(Self {
            control,
            session,
            env,
            handlers,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.control.peer()
    }

    /// Runs the session until QUIT, end of stream or a control read/write failure.
    pub async fn run(mut self) {
        let peer = self.peer();
        info!("Client {peer} connected");

        let greeting = Reply::new(READY, format!("Welcome to Jail FTP Server, {peer}."));
        if let Err(e) = self.control.send(&greeting).await {
            warn!("Failed to greet {peer}: {e}");
            return;
        }

        loop {
            let line = match self.control.read_line().await {
                Ok(Line::Command(line)) => line,
                Ok(Line::TooLong) => {
                    warn!("Command line from {peer} exceeds the length limit");
                    if self.control.send(&Reply::new(SYNTAX_ERROR, "Command line too long.")).await.is_err() {
                        break;
                    }
                    continue;
                }
                Ok(Line::Eof) => {
                    info!("Connection closed by client {peer}");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from {peer}: {e}");
                    break;
                }
            };

            let command = parse_command(&line);
            if command.is_empty() {
                continue;
            }
            if command.verb == "PASS" {
                debug!("Received from {peer}: PASS ****");
            } else {
                debug!("Received from {peer}: {} {}", command.verb, command.arg);
            }

            let result = self.dispatch(&command).await;

            if let Some(reply) = &result.reply {
                if let Err(e) = self.control.send(reply).await {
                    warn!("Failed to write to {peer}: {e}");
                    break;
                }
            }

            match result.status {
                CommandStatus::Success => {}
                CommandStatus::Failure(reason) => {
                    debug!("{} from {peer} failed: {reason}", command.verb);
                }
                CommandStatus::CloseConnection => break,
            }
        }

        if let Some(mut transport) = self.session.take_transport() {
            transport.close().await;
        }
        self.control.shutdown().await;
        info!("Client {peer} disconnected");
    }

    async fn dispatch(&mut self, command: &CommandLine) -> CommandResult {
        let Some(handler) = self.handlers.get(&command.verb) else {
            warn!("Unsupported command {} from {}", command.verb, self.peer());
            return CommandResult::failure(
                Reply::standard(NOT_IMPLEMENTED),
                format!("unknown verb {}", command.verb),
            );
        };

        if handler.requires_auth() && !self.session.is_authenticated() {
            return CommandResult::failure(
                Reply::standard(NOT_LOGGED_IN),
                "authentication required",
            );
        }

        let mut cx = CommandContext {
            session: &mut self.session,
            control: &mut self.control,
            env: &self.env,
        };
        handler.handle(&mut cx, &command.arg).await
    }
}
