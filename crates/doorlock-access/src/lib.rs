//! Access decisions and relay sequences for the door.
//!
//! [`AccessController`] takes card scans, asks a
//! [`Registry`](doorlock_storage::Registry) who the card belongs to, and
//! drives the door strike and the signal lamps on a
//! [`RelayBoard`](doorlock_hardware::RelayBoard). See [`controller`] for the
//! sequences and [`state`] for the phases reported while they run.

pub mod controller;
pub mod error;
pub mod state;

pub use controller::{AccessController, AccessSettings};
pub use error::{AccessError, Result};
pub use state::AccessState;
