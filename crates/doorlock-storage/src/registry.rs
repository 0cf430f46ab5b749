//! Card and user lookups used at the door.
//!
//! The access controller only needs two questions answered: which card has
//! this UID, and who owns that card. [`Registry`] captures exactly that, with
//! [`SqliteRegistry`] as the production backend and [`MemoryRegistry`] for
//! tests and simulation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use doorlock_core::Uid;
use tracing::{debug, info};

use crate::connection::Database;
use crate::error::{StorageError, StorageResult};
use crate::models::{Card, User, UserKind};

/// Read side of the card/user registry.
///
/// Methods return `Send` futures so the controller can run on a spawned task.
pub trait Registry: Send + Sync {
    /// The card carrying `uid`, if registered.
    fn find_card_by_uid(
        &self,
        uid: &Uid,
    ) -> impl Future<Output = StorageResult<Option<Card>>> + Send;

    /// The user owning `card`, if any.
    fn find_user_for_card(
        &self,
        card: &Card,
    ) -> impl Future<Output = StorageResult<Option<User>>> + Send;
}

impl<R: Registry> Registry for Arc<R> {
    fn find_card_by_uid(
        &self,
        uid: &Uid,
    ) -> impl Future<Output = StorageResult<Option<Card>>> + Send {
        (**self).find_card_by_uid(uid)
    }

    fn find_user_for_card(
        &self,
        card: &Card,
    ) -> impl Future<Output = StorageResult<Option<User>>> + Send {
        (**self).find_user_for_card(card)
    }
}

/// Registry backed by the SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    db: Database,
}

impl SqliteRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register a user.
    ///
    /// # Errors
    /// [`StorageError::Duplicate`] if the username is taken.
    pub async fn create_user(&self, username: &str, kind: UserKind) -> StorageResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, kind, disabled, created_at)
            VALUES (?, ?, 0, ?)
            RETURNING id, username, kind, disabled, created_at
            "#,
        )
        .bind(username)
        .bind(kind)
        .bind(Utc::now())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| StorageError::from_insert(e, "user", username))?;

        info!(user_id = user.id, username, %kind, "User created");
        Ok(user)
    }

    /// Register a card, optionally handing it to `user_id`.
    ///
    /// # Errors
    /// [`StorageError::Duplicate`] if the UID is already registered.
    pub async fn create_card(&self, uid: &Uid, user_id: Option<i64>) -> StorageResult<Card> {
        let card = sqlx::query_as::<_, Card>(
            r#"
            INSERT INTO cards (uid, user_id, created_at)
            VALUES (?, ?, ?)
            RETURNING id, uid, user_id, created_at
            "#,
        )
        .bind(uid.as_str())
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| StorageError::from_insert(e, "card", uid.as_str()))?;

        info!(card_id = card.id, %uid, ?user_id, "Card created");
        Ok(card)
    }

    /// Enable or disable a user.
    pub async fn set_user_disabled(&self, user_id: i64, disabled: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET disabled = ? WHERE id = ?")
            .bind(disabled)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("user", "id", user_id));
        }
        Ok(())
    }
}

impl Registry for SqliteRegistry {
    async fn find_card_by_uid(&self, uid: &Uid) -> StorageResult<Option<Card>> {
        let card = sqlx::query_as::<_, Card>(
            r#"
            SELECT id, uid, user_id, created_at
            FROM cards
            WHERE uid = ?
            "#,
        )
        .bind(uid.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        debug!(%uid, found = card.is_some(), "Card lookup");
        Ok(card)
    }

    async fn find_user_for_card(&self, card: &Card) -> StorageResult<Option<User>> {
        let Some(user_id) = card.user_id else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, kind, disabled, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(user)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<i64, User>,
    cards: HashMap<String, Card>,
    next_id: i64,
    unavailable: bool,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable {
            return Err(StorageError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

/// In-process registry with the same semantics as [`SqliteRegistry`].
///
/// Clones share state. [`set_unavailable`](Self::set_unavailable) makes every
/// lookup fail, which is how tests exercise the "registry down" path.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_user(&self, username: &str, kind: UserKind) -> StorageResult<User> {
        let mut state = self.lock();
        if state.users.values().any(|user| user.username == username) {
            return Err(StorageError::duplicate("user", username));
        }

        let user = User {
            id: state.next_id(),
            username: username.to_string(),
            kind,
            disabled: false,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn create_card(&self, uid: &Uid, user_id: Option<i64>) -> StorageResult<Card> {
        let mut state = self.lock();
        if state.cards.contains_key(uid.as_str()) {
            return Err(StorageError::duplicate("card", uid.as_str()));
        }
        if let Some(id) = user_id
            && !state.users.contains_key(&id)
        {
            return Err(StorageError::not_found("user", "id", id));
        }

        let card = Card {
            id: state.next_id(),
            uid: uid.as_str().to_string(),
            user_id,
            created_at: Utc::now(),
        };
        state.cards.insert(card.uid.clone(), card.clone());
        Ok(card)
    }

    pub fn set_user_disabled(&self, user_id: i64, disabled: bool) -> StorageResult<()> {
        let mut state = self.lock();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::not_found("user", "id", user_id))?;
        user.disabled = disabled;
        Ok(())
    }

    /// Make every lookup fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }
}

impl Registry for MemoryRegistry {
    async fn find_card_by_uid(&self, uid: &Uid) -> StorageResult<Option<Card>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.cards.get(uid.as_str()).cloned())
    }

    async fn find_user_for_card(&self, card: &Card) -> StorageResult<Option<User>> {
        let state = self.lock();
        state.check_available()?;
        Ok(card.user_id.and_then(|id| state.users.get(&id).cloned()))
    }
}
