//! Shared building blocks for the doorlock workspace.
//!
//! - [`types`]: validated domain values (card UIDs, relay numbers and masks,
//!   board addresses, access events and decisions)
//! - [`constants`]: relay-board wire protocol constants and timing defaults
//! - [`config`]: TOML configuration consumed by the binary and the controller
//! - [`error`]: the error type used by everything above

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
