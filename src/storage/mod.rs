//! File system storage management
//!
//! Confines client paths to the session root and renders directory listings.

pub mod listing;
pub mod sandbox;

pub use listing::{ListEntry, collect_entries};
pub use sandbox::{display_path, resolve, resolve_upload, validate, validate_dir, validate_file};
