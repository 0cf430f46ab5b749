//! Device layer of the door lock: the serial relay board and the RFID reader.
//!
//! # Relay board
//!
//! Two layers sit on top of the wire protocol from `doorlock-protocol`:
//!
//! - [`RelayLink`] moves 4-byte frames over the serial line. It offers a
//!   fire-and-forget [`send`](RelayLink::send) and a
//!   [`request`](RelayLink::request) that waits for the board's answer, one at
//!   a time, callers queued in arrival order.
//! - [`RelayBoard`] owns the link and the board address and exposes one typed
//!   method per command, checking the echo of every answer.
//!
//! ```no_run
//! use doorlock_hardware::{RelayBoard, RelayLink};
//! use doorlock_core::RelayNumber;
//! use std::time::Duration;
//!
//! # async fn example() -> doorlock_hardware::Result<()> {
//! let board = RelayBoard::new(RelayLink::new("/dev/ttyUSB1", Duration::from_secs(1)));
//! board.connect().await?;
//!
//! if board.setup().await {
//!     board.deactivate_all(Duration::from_millis(100)).await?;
//!     board.set_single(RelayNumber::new(1).unwrap()).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # RFID reader
//!
//! [`RfidReader`] yields card UIDs; [`SerialRfidReader`] reads them one per
//! line from a serial device. [`ScanPump`] forwards scans to the access
//! controller as [`AccessEvent`](doorlock_core::AccessEvent)s.
//!
//! # Mock devices
//!
//! [`mock`] contains a simulated relay board (over `tokio::io::duplex`) and a
//! simulated reader, used by the tests and by `doorlock run --simulate`.

pub mod board;
pub mod error;
pub mod link;
pub mod mock;
pub mod rfid;

pub use board::RelayBoard;
pub use error::{LinkError, ReaderError, ReaderResult, Result};
pub use link::{LinkEvent, RelayLink};
pub use rfid::{RfidReader, ScanPump, SerialRfidReader};
