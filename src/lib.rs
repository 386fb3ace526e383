//! Scene Tagger Library
//!
//! Batch metadata reconciliation for a local media server: scrape many
//! scenes from a selected source, create the missing tags, performers and
//! studios, and save the results back in bulk.

pub mod client;
pub mod core;
pub mod tagger;

// Re-export commonly used types
pub use crate::core::{Config, Notifier, TaggerError};
pub use client::GraphqlClient;
pub use tagger::{StashBackend, Tagger, TaggerSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
