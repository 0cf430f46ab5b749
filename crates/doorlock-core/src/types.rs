use crate::{
    Result,
    constants::{ALL_RELAYS_MASK, RELAY_COUNT, UNASSIGNED_ADDRESS},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Maximum accepted length of a card UID string.
pub const MAX_UID_LENGTH: usize = 64;

/// Card UID as emitted by the RFID reader.
///
/// The reader delivers UIDs as text. They are normalized (trimmed and
/// converted to uppercase) so that `"04ab12cd"` and `"04AB12CD\r"` compare
/// equal.
///
/// # Security
/// Comparison is constant-time so lookups do not leak how much of a UID
/// matched.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Create a new UID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if the normalized value is empty, longer than
    /// [`MAX_UID_LENGTH`], or contains non-printable or whitespace characters.
    pub fn new(raw: &str) -> Result<Self> {
        let uid = raw.trim().to_uppercase();

        if uid.is_empty() {
            return Err(Error::InvalidUid("UID is empty".to_string()));
        }

        if uid.len() > MAX_UID_LENGTH {
            return Err(Error::InvalidUid(format!(
                "UID must be at most {MAX_UID_LENGTH} chars, got {}",
                uid.len()
            )));
        }

        if !uid.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(Error::InvalidUid(format!(
                "UID must be printable ASCII without spaces: {uid:?}"
            )));
        }

        Ok(Uid(uid))
    }

    /// Get the UID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uid::new(s)
    }
}

impl TryFrom<String> for Uid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Uid::new(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl PartialEq for Uid {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for Uid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Address the relay board assigned to itself during setup (1-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardAddress(u8);

impl BoardAddress {
    /// Create a board address.
    ///
    /// # Errors
    /// Returns `Error::UnassignedAddress` for 0, which the protocol reserves for
    /// "not set up yet".
    pub fn new(address: u8) -> Result<Self> {
        if address == UNASSIGNED_ADDRESS {
            return Err(Error::UnassignedAddress);
        }
        Ok(BoardAddress(address))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for BoardAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One relay on the board, numbered 1 through 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RelayNumber(u8);

impl RelayNumber {
    /// Create a relay number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidRelayNumber` if `number` is outside 1-8.
    pub fn new(number: u8) -> Result<Self> {
        if !(1..=RELAY_COUNT).contains(&number) {
            return Err(Error::InvalidRelayNumber(number));
        }
        Ok(RelayNumber(number))
    }

    /// Create a relay number without validation (for internal use).
    ///
    /// Caller must ensure the number is in range 1-8.
    pub(crate) const fn new_unchecked(number: u8) -> Self {
        debug_assert!(number >= 1 && number <= RELAY_COUNT);
        RelayNumber(number)
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// The single-bit mask selecting this relay (relay 1 is bit 0).
    #[must_use]
    pub fn mask(&self) -> RelayMask {
        RelayMask(1 << (self.0 - 1))
    }

    /// All relays in ascending order.
    pub fn all() -> impl Iterator<Item = RelayNumber> {
        (1..=RELAY_COUNT).map(RelayNumber)
    }
}

impl TryFrom<u8> for RelayNumber {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        RelayNumber::new(value)
    }
}

impl From<RelayNumber> for u8 {
    fn from(relay: RelayNumber) -> Self {
        relay.0
    }
}

impl fmt::Display for RelayNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "relay {}", self.0)
    }
}

/// Bit field over the eight relays; bit `n` stands for relay `n + 1`.
///
/// Used both as the payload of relay commands and as the port state the board
/// reports back.
///
/// # Examples
///
/// ```
/// use doorlock_core::{RelayMask, RelayNumber};
///
/// let mask = RelayMask::from_states([true, false, true, false, false, false, false, false]);
/// assert_eq!(mask.bits(), 0b0000_0101);
/// assert!(mask.contains(RelayNumber::new(3).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RelayMask(u8);

impl RelayMask {
    /// No relay selected. Also the neutral value reported for unconfirmed
    /// results.
    pub const EMPTY: RelayMask = RelayMask(0);

    /// Every relay selected.
    pub const ALL: RelayMask = RelayMask(ALL_RELAYS_MASK);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        RelayMask(bits)
    }

    /// Build a mask from per-relay flags, index 0 being relay 1.
    #[must_use]
    pub fn from_states(states: [bool; 8]) -> Self {
        let bits = states
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .fold(0u8, |acc, (i, _)| acc | (1 << i));
        RelayMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(&self, relay: RelayNumber) -> bool {
        self.0 & relay.mask().0 != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The eight single-relay masks `1, 2, 4, ..., 128` in ascending order.
    pub fn singles() -> impl Iterator<Item = RelayMask> {
        (0..RELAY_COUNT).map(|bit| RelayMask(1 << bit))
    }

    /// Relays selected by this mask, ascending.
    pub fn relays(&self) -> impl Iterator<Item = RelayNumber> + '_ {
        RelayNumber::all().filter(|relay| self.contains(*relay))
    }
}

impl From<RelayNumber> for RelayMask {
    fn from(relay: RelayNumber) -> Self {
        relay.mask()
    }
}

impl std::ops::BitOr for RelayMask {
    type Output = RelayMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        RelayMask(self.0 | rhs.0)
    }
}

impl fmt::Display for RelayMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}

/// One card scan, created when the reader emits a UID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Correlation id used in logs for the whole attempt.
    pub id: Uuid,

    /// Scanned card UID.
    pub uid: Uid,

    /// When the scan was received.
    pub timestamp: DateTime<Utc>,
}

impl AccessEvent {
    /// Create an event for `uid` stamped with the current time.
    pub fn new(uid: Uid) -> Self {
        Self {
            id: Uuid::new_v4(),
            uid,
            timestamp: Utc::now(),
        }
    }
}

/// Why an access attempt was granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Card linked to an enabled user.
    Granted,

    /// No card with this UID is registered.
    UnknownCard,

    /// The card exists but no user is linked to it.
    NoLinkedUser,

    /// The linked user is disabled.
    UserDisabled,

    /// The registry could not be queried.
    RegistryUnavailable,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            DecisionReason::Granted => "granted",
            DecisionReason::UnknownCard => "unknown card",
            DecisionReason::NoLinkedUser => "card has no linked user",
            DecisionReason::UserDisabled => "user disabled",
            DecisionReason::RegistryUnavailable => "registry unavailable",
        };
        f.write_str(text)
    }
}

/// Outcome of the registry lookup for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    #[must_use]
    pub fn grant() -> Self {
        Self {
            granted: true,
            reason: DecisionReason::Granted,
        }
    }

    #[must_use]
    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            granted: false,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_uid_normalization() {
        let uid = Uid::new("  04ab12cd\r\n").unwrap();
        assert_eq!(uid.as_str(), "04AB12CD");
        assert_eq!(uid, Uid::new("04AB12CD").unwrap());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("04 AB")]
    #[case("04\u{e9}")]
    fn test_uid_rejects_invalid(#[case] raw: &str) {
        assert!(matches!(Uid::new(raw), Err(Error::InvalidUid(_))));
    }

    #[test]
    fn test_uid_too_long() {
        let raw = "A".repeat(MAX_UID_LENGTH + 1);
        assert!(Uid::new(&raw).is_err());
        assert!(Uid::new(&raw[..MAX_UID_LENGTH]).is_ok());
    }

    #[test]
    fn test_uid_serde_normalizes() {
        let uid: Uid = serde_json::from_str("\"deadbeef\"").unwrap();
        assert_eq!(uid.as_str(), "DEADBEEF");
        assert!(serde_json::from_str::<Uid>("\"\"").is_err());
    }

    #[test]
    fn test_board_address_rejects_zero() {
        assert!(matches!(BoardAddress::new(0), Err(Error::UnassignedAddress)));
        assert_eq!(BoardAddress::new(1).unwrap().as_u8(), 1);
        assert_eq!(BoardAddress::new(255).unwrap().as_u8(), 255);
    }

    #[rstest]
    #[case(1, 0b0000_0001)]
    #[case(2, 0b0000_0010)]
    #[case(4, 0b0000_1000)]
    #[case(8, 0b1000_0000)]
    fn test_relay_number_mask(#[case] number: u8, #[case] bits: u8) {
        let relay = RelayNumber::new(number).unwrap();
        assert_eq!(relay.mask().bits(), bits);
    }

    #[rstest]
    #[case(0)]
    #[case(9)]
    #[case(255)]
    fn test_relay_number_out_of_range(#[case] number: u8) {
        assert!(matches!(
            RelayNumber::new(number),
            Err(Error::InvalidRelayNumber(n)) if n == number
        ));
    }

    #[test]
    fn test_relay_mask_singles_order() {
        let singles: Vec<u8> = RelayMask::singles().map(|m| m.bits()).collect();
        assert_eq!(singles, vec![1, 2, 4, 8, 16, 32, 64, 128]);
    }

    #[test]
    fn test_relay_mask_from_states() {
        assert_eq!(RelayMask::from_states([true; 8]), RelayMask::ALL);
        assert_eq!(RelayMask::from_states([false; 8]), RelayMask::EMPTY);

        let mask =
            RelayMask::from_states([false, true, false, false, false, false, false, true]);
        assert_eq!(mask.bits(), 0b1000_0010);
        let relays: Vec<u8> = mask.relays().map(|r| r.as_u8()).collect();
        assert_eq!(relays, vec![2, 8]);
    }

    #[test]
    fn test_relay_mask_bitor() {
        let door = RelayNumber::new(1).unwrap();
        let green = RelayNumber::new(4).unwrap();
        let mask = RelayMask::from(door) | RelayMask::from(green);
        assert_eq!(mask.bits(), 0b0000_1001);
        assert_eq!(mask.to_string(), "0b00001001");
    }

    #[test]
    fn test_access_event_new() {
        let event = AccessEvent::new(Uid::new("abc123").unwrap());
        assert_eq!(event.uid.as_str(), "ABC123");
        assert!(event.timestamp <= Utc::now());
    }

    #[test]
    fn test_access_decision_constructors() {
        assert!(AccessDecision::grant().granted);
        let denied = AccessDecision::deny(DecisionReason::UserDisabled);
        assert!(!denied.granted);
        assert_eq!(denied.reason.to_string(), "user disabled");
    }
}
