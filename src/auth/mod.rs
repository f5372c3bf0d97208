//! Authentication system
//!
//! Holds the account table consulted by `PASS`.

pub mod accounts;

pub use accounts::{Account, AccountStore};
