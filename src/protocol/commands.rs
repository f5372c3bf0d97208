//! Module `commands`
//!
//! Splits a raw control line into its verb and argument, and defines the
//! outcome type every command handler returns.

use crate::protocol::responses::Reply;

/// Status of a handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Result of a command: its status and the final reply to send, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub reply: Option<Reply>,
}

impl CommandResult {
    pub fn success(reply: Reply) -> Self {
        Self {
            status: CommandStatus::Success,
            reply: Some(reply),
        }
    }

    pub fn failure(reply: Reply, reason: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failure(reason.into()),
            reply: Some(reply),
        }
    }

    /// Ends the session after `reply` (if any) has been written.
    pub fn close(reply: Option<Reply>) -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            reply,
        }
    }
}

/// A control line split as `VERB[ ARGUMENT]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Upper-cased verb.
    pub verb: String,
    /// Everything after the first space, verbatim. Empty when absent.
    pub arg: String,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.verb.is_empty()
    }
}

/// Parses a raw command string received from a client.
///
/// Only the line terminator is stripped from the argument, so file names may
/// contain spaces.
pub fn parse_command(raw: &str) -> CommandLine {
    let line = raw.trim_end_matches(['\r', '\n']);
    let (verb, arg) = match line.split_once(' ') {
        Some((verb, arg)) => (verb, arg),
        None => (line, ""),
    };

    CommandLine {
        verb: verb.trim().to_ascii_uppercase(),
        arg: arg.to_string(),
    }
}
