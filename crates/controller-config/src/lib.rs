//! Controller configuration
//!
//! Static configuration document loaded once at process start. A document
//! that cannot be read or parsed is fatal: the controller never starts with a
//! half-understood configuration.

pub mod configuration;
pub mod error;

pub use configuration::*;
pub use error::ConfigError;
