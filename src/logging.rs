//! Logging setup
//!
//! Installs `env_logger` with a `[timestamp] [level] message` format. When a
//! log file is configured, records are appended to it instead of stderr.

use env_logger::{Builder, Env, Target};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Setup logging for the server
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        let timestamp = buf.timestamp();
        writeln!(buf, "[{}] [{}] {}", timestamp, record.level(), record.args())
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}
