//! Card/user registry for the doorlock controller.
//!
//! The access controller asks two questions per scan: which card has this
//! UID, and who owns it. This crate answers them from SQLite
//! ([`SqliteRegistry`]) or from memory ([`MemoryRegistry`]), both behind the
//! [`Registry`] trait.
//!
//! # Examples
//!
//! ```no_run
//! use doorlock_core::Uid;
//! use doorlock_storage::{Database, DatabaseConfig, Registry, SqliteRegistry};
//! use doorlock_storage::models::UserKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("doorlock.db")).await?;
//! let registry = SqliteRegistry::new(db);
//!
//! let alice = registry.create_user("alice", UserKind::User).await?;
//! registry.create_card(&Uid::new("04ab12cd")?, Some(alice.id)).await?;
//!
//! if let Some(card) = registry.find_card_by_uid(&Uid::new("04AB12CD")?).await? {
//!     let owner = registry.find_user_for_card(&card).await?;
//!     println!("card {} belongs to {:?}", card.uid, owner.map(|u| u.username));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Migrations live in `migrations/` at the workspace root and are embedded at
//! compile time.

pub mod connection;
pub mod error;
pub mod models;
pub mod registry;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{Card, User, UserKind};
pub use registry::{MemoryRegistry, Registry, SqliteRegistry};
