//! # Nexus Common Library
//!
//! Shared code for the Nexus host tools including:
//! - Error types
//! - Configuration loading (root folder, TOML)
//! - Event types and the broadcast event bus
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, NexusEvent};
