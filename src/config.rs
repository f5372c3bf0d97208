//! Configuration management for the jailed FTP server
//!
//! Values are layered: built-in defaults for the selected path profile, then an
//! optional TOML file, then `JAILFTP_*` environment variables. Command-line
//! overrides are applied by the binary before [`ServerConfig::validate`] runs.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Where the default root, account file and log file live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathProfile {
    /// System-wide install under `/srv/ftp`.
    Deployed,
    /// Everything relative to the working directory.
    Native,
}

/// Complete server configuration, built once at startup and shared read-only.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// IP address to bind the FTP control connection
    pub bind_address: String,

    /// Port for the FTP control connection
    pub control_port: u16,

    /// Port window scanned for PASV listeners. The control port must fall inside it.
    pub passive_port_min: u16,
    pub passive_port_max: u16,

    /// IPv4 address advertised in PASV replies instead of the control socket's own address
    pub pasv_address: Option<String>,

    /// Directory all account roots are resolved against
    pub server_root: String,

    /// Flat `user password root` account table
    pub accounts_file: String,

    /// Append-only log file; stderr when unset
    pub log_file: Option<String>,

    /// Maximum FTP command line length
    pub max_command_length: usize,

    /// Full scans of the passive window before PASV gives up
    pub passive_bind_attempts: u32,

    /// Buffer size for file transfers
    pub transfer_buffer_size: usize,
}

impl ServerConfig {
    /// Built-in defaults for a path profile.
    pub fn defaults(profile: PathProfile) -> Self {
        let (root, accounts, log) = match profile {
            PathProfile::Deployed => (
                "/srv/ftp/root",
                "/srv/ftp/accounts.dat",
                "/srv/ftp/ftp.log",
            ),
            PathProfile::Native => ("./ftpdir", "./ftpAccounts.dat", "./ftp.log"),
        };

        Self {
            bind_address: "0.0.0.0".to_string(),
            control_port: 2121,
            passive_port_min: 2121,
            passive_port_max: 2200,
            pasv_address: None,
            server_root: root.to_string(),
            accounts_file: accounts.to_string(),
            log_file: Some(log.to_string()),
            max_command_length: 512,
            passive_bind_attempts: 3,
            transfer_buffer_size: 8192,
        }
    }

    /// Load configuration from profile defaults, a TOML file and environment overrides.
    ///
    /// With `file == None` a `config.toml` in the working directory is used when present.
    pub fn load(profile: PathProfile, file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("config").required(false),
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&Self::defaults(profile))?)
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("JAILFTP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.passive_port_min > self.passive_port_max {
            return Err(ConfigError::Message(
                "passive_port_min must not exceed passive_port_max".into(),
            ));
        }

        if !self.passive_ports().contains(&self.control_port) {
            return Err(ConfigError::Message(format!(
                "Required port number in [{}, {}], got {}",
                self.passive_port_min, self.passive_port_max, self.control_port
            )));
        }

        if self.server_root.is_empty() {
            return Err(ConfigError::Message("server_root cannot be empty".into()));
        }

        if self.accounts_file.is_empty() {
            return Err(ConfigError::Message("accounts_file cannot be empty".into()));
        }

        if let Some(addr) = &self.pasv_address {
            addr.parse::<Ipv4Addr>().map_err(|_| {
                ConfigError::Message(format!("pasv_address {addr} is not an IPv4 address"))
            })?;
        }

        if self.max_command_length < 16 {
            return Err(ConfigError::Message(
                "max_command_length must be at least 16".into(),
            ));
        }

        if self.passive_bind_attempts == 0 {
            return Err(ConfigError::Message(
                "passive_bind_attempts must be greater than 0".into(),
            ));
        }

        if self.transfer_buffer_size == 0 {
            return Err(ConfigError::Message(
                "transfer_buffer_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Get the port window used for PASV listeners
    pub fn passive_ports(&self) -> RangeInclusive<u16> {
        self.passive_port_min..=self.passive_port_max
    }

    /// Advertised PASV address, if configured
    pub fn pasv_ipv4(&self) -> Option<Ipv4Addr> {
        self.pasv_address.as_deref().and_then(|a| a.parse().ok())
    }

    /// Get server root as PathBuf
    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }

    /// Get account file as PathBuf
    pub fn accounts_path(&self) -> PathBuf {
        PathBuf::from(&self.accounts_file)
    }
}
