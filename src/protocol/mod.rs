//! FTP Protocol implementation
//!
//! Handles FTP command parsing, dispatch to per-verb handlers, and reply formatting.

pub mod commands;
pub mod handlers;
pub mod registry;
pub mod responses;

pub use commands::{CommandLine, CommandResult, CommandStatus, parse_command};
pub use handlers::{CommandContext, CommandHandler};
pub use registry::HandlerRegistry;
pub use responses::Reply;
