//! Core configuration for hookrelay
//!
//! Holds the immutable [`RelayConfig`] snapshot that every other component
//! receives at construction time. Settings come from built-in defaults, an
//! optional TOML file and `RELAY__*` environment variables, in that order.

pub mod config;
pub mod error;

pub use self::config::*;
pub use self::error::*;
