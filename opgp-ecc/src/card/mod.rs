//! Card access
//!
//! The transport boundary, the command client built on it and the client
//! configuration.

pub mod client;
pub mod config;
mod error;
mod transport;

pub use client::{pw, CardClient};
pub use config::{ClientConfig, ConfigError};
pub use error::CardError;
pub use transport::CardTransport;
