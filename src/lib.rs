pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use config::{PathProfile, ServerConfig};
pub use server::Server;
