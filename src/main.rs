//! Jail FTP Server - Entry Point
//!
//! A passive-mode FTP server that confines every account to its own directory.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use jail_ftp_server::auth::AccountStore;
use jail_ftp_server::{PathProfile, Server, ServerConfig, logging};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "jail-ftp-server", about = "A jailed passive-mode FTP server.")]
struct Cli {
    /// Control port; must lie inside the passive port window
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind the control listener to
    #[arg(short, long)]
    address: Option<String>,

    /// Server root directory
    #[arg(short, long)]
    dir: Option<String>,

    /// Use paths relative to the working directory instead of /srv/ftp
    #[arg(long)]
    native: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account file (`user password rootDirectory` per line)
    #[arg(long)]
    accounts: Option<String>,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    log_file: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.control_port = port;
        }
        if let Some(address) = self.address {
            config.bind_address = address;
        }
        if let Some(dir) = self.dir {
            config.server_root = dir;
        }
        if let Some(accounts) = self.accounts {
            config.accounts_file = accounts;
        }
        if let Some(log_file) = self.log_file {
            config.log_file = Some(log_file);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let profile = if cli.native {
        PathProfile::Native
    } else {
        PathProfile::Deployed
    };

    let mut config = ServerConfig::load(profile, cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let log_file = config.log_file.as_ref().map(PathBuf::from);
    logging::init(log_file.as_deref()).context("Failed to initialise logging")?;

    let accounts = AccountStore::load(&config.accounts_path())?;

    info!("Launching FTP server...");
    let addr = config.control_socket();
    let server = Server::bind(&addr, Arc::new(config), Arc::new(accounts)).await?;

    tokio::select! {
        _ = server.serve() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested, exiting");
        }
    }

    Ok(())
}
