//! Phases of an access attempt.
//!
//! ```text
//! Idle ──> Evaluating ──> Granting ──> Idle
//!  │             └──────> Denying ───> Idle
//!  └─────────────────────> Granting        (door command, no scan)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the controller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    /// Waiting for a scan or a door command.
    Idle,

    /// Looking the scanned card up in the registry.
    Evaluating,

    /// Running the door-open sequence.
    Granting,

    /// Running the deny lamp sequence.
    Denying,
}

impl AccessState {
    pub fn can_transition_to(&self, target: &AccessState) -> bool {
        matches!(
            (self, target),
            (AccessState::Idle, AccessState::Evaluating | AccessState::Granting)
                | (
                    AccessState::Evaluating,
                    AccessState::Granting | AccessState::Denying | AccessState::Idle
                )
                | (AccessState::Granting | AccessState::Denying, AccessState::Idle)
        )
    }

    pub fn is_idle(&self) -> bool {
        *self == AccessState::Idle
    }
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AccessState::Idle => "Idle",
            AccessState::Evaluating => "Evaluating",
            AccessState::Granting => "Granting",
            AccessState::Denying => "Denying",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AccessState::Idle, AccessState::Evaluating, true)]
    #[case(AccessState::Idle, AccessState::Granting, true)]
    #[case(AccessState::Idle, AccessState::Denying, false)]
    #[case(AccessState::Evaluating, AccessState::Granting, true)]
    #[case(AccessState::Evaluating, AccessState::Denying, true)]
    #[case(AccessState::Evaluating, AccessState::Idle, true)]
    #[case(AccessState::Granting, AccessState::Idle, true)]
    #[case(AccessState::Granting, AccessState::Denying, false)]
    #[case(AccessState::Denying, AccessState::Idle, true)]
    #[case(AccessState::Denying, AccessState::Evaluating, false)]
    fn test_transitions(
        #[case] from: AccessState,
        #[case] to: AccessState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_display() {
        assert_eq!(AccessState::Evaluating.to_string(), "Evaluating");
        assert!(AccessState::Idle.is_idle());
    }
}
