//! Core application layer
//!
//! This module provides the ambient services shared by the tagger:
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system
//! - User-visible notifications

pub mod config;
pub mod error;
pub mod logging;
pub mod notify;

pub use config::Config;
pub use error::{ErrorContext, ErrorReport, Result, TaggerError};
pub use logging::Logger;
pub use notify::{Notification, NotificationLevel, Notifier};
