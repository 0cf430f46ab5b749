use chrono::{DateTime, Utc};
use doorlock_core::Uid;
use serde::{Deserialize, Serialize};

/// An RFID card known to the registry.
///
/// `uid` is stored in the normalized form produced by [`Uid`] (trimmed,
/// uppercase), so lookups by a scanned UID are exact matches. A card may
/// exist without an owner; scanning such a card is denied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Card {
    pub id: i64,

    /// Normalized card UID (unique)
    pub uid: String,

    /// Owning user, if the card has been handed out
    pub user_id: Option<i64>,

    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn is_linked(&self) -> bool {
        self.user_id.is_some()
    }

    /// Whether this card carries `uid`.
    pub fn matches(&self, uid: &Uid) -> bool {
        Uid::new(&self.uid).is_ok_and(|stored| &stored == uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_link_and_match() {
        let mut card = Card {
            id: 1,
            uid: "04AB12CD".to_string(),
            user_id: None,
            created_at: Utc::now(),
        };
        assert!(!card.is_linked());
        assert!(card.matches(&Uid::new("04ab12cd").unwrap()));

        card.user_id = Some(3);
        assert!(card.is_linked());
    }
}
