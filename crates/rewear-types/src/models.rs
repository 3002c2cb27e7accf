use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a string-backed enum whose spelling matches the database column.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Account role. Admins moderate listings and manage users.
    Role, "role" {
        User => "user",
        Admin => "admin",
    }
);

string_enum!(
    ItemCondition, "condition" {
        New => "new",
        LikeNew => "like_new",
        Good => "good",
        Fair => "fair",
        Poor => "poor",
    }
);

string_enum!(
    /// Direction of a ledger entry. Amounts are always positive.
    TransactionType, "transaction type" {
        Earned => "earned",
        Spent => "spent",
        Refunded => "refunded",
    }
);

string_enum!(
    NotificationKind, "notification kind" {
        SwapRequest => "swap_request",
        SwapAccepted => "swap_accepted",
        SwapRejected => "swap_rejected",
        SwapCancelled => "swap_cancelled",
        SwapCompleted => "swap_completed",
        ItemApproved => "item_approved",
        ItemRejected => "item_rejected",
        ItemRemoved => "item_removed",
    }
);

string_enum!(
    SwapStatus, "swap status" {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

string_enum!(
    SwapAction, "swap action" {
        Accept => "accept",
        Reject => "reject",
        Cancel => "cancel",
        Complete => "complete",
    }
);

/// Which side of a swap the acting user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapParty {
    /// Owner of the requested item.
    Owner,
    Requester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a swap that is {from}")]
    InvalidState { from: SwapStatus, action: SwapAction },
    #[error("{party:?} may not {action} this swap")]
    NotPermitted { action: SwapAction, party: SwapParty },
}

impl SwapStatus {
    /// Rejected, cancelled and completed swaps never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }

    /// Validates `action` performed by `party` against the current status and
    /// returns the status the swap moves to.
    ///
    /// This is the only place swap transitions are defined; every lifecycle
    /// endpoint goes through it before touching the database.
    pub fn apply(self, action: SwapAction, party: SwapParty) -> Result<SwapStatus, TransitionError> {
        let (required, next) = match action {
            SwapAction::Accept => (Self::Pending, Self::Accepted),
            SwapAction::Reject => (Self::Pending, Self::Rejected),
            SwapAction::Cancel => (Self::Pending, Self::Cancelled),
            SwapAction::Complete => (Self::Accepted, Self::Completed),
        };

        if self != required {
            return Err(TransitionError::InvalidState { from: self, action });
        }

        let permitted = match action {
            SwapAction::Accept | SwapAction::Reject => party == SwapParty::Owner,
            SwapAction::Cancel => party == SwapParty::Requester,
            SwapAction::Complete => true,
        };
        if !permitted {
            return Err(TransitionError::NotPermitted { action, party });
        }

        Ok(next)
    }
}

impl SwapAction {
    /// Notification sent to the counter-party once the transition lands.
    pub fn notification(self) -> (NotificationKind, &'static str) {
        match self {
            Self::Accept => (NotificationKind::SwapAccepted, "Swap Accepted"),
            Self::Reject => (NotificationKind::SwapRejected, "Swap Rejected"),
            Self::Cancel => (NotificationKind::SwapCancelled, "Swap Cancelled"),
            Self::Complete => (NotificationKind::SwapCompleted, "Swap Completed"),
        }
    }

    pub fn notification_message(self, item_title: &str) -> String {
        match self {
            Self::Accept => format!("Your swap request for \"{}\" has been accepted!", item_title),
            Self::Reject => format!("Your swap request for \"{}\" has been rejected.", item_title),
            Self::Cancel => format!("Swap request for \"{}\" has been cancelled.", item_title),
            Self::Complete => format!("Swap for \"{}\" has been marked as completed.", item_title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions() {
        let s = SwapStatus::Pending;
        assert_eq!(s.apply(SwapAction::Accept, SwapParty::Owner), Ok(SwapStatus::Accepted));
        assert_eq!(s.apply(SwapAction::Reject, SwapParty::Owner), Ok(SwapStatus::Rejected));
        assert_eq!(s.apply(SwapAction::Cancel, SwapParty::Requester), Ok(SwapStatus::Cancelled));
        assert!(matches!(
            s.apply(SwapAction::Complete, SwapParty::Owner),
            Err(TransitionError::InvalidState { .. })
        ));
    }

    #[test]
    fn wrong_party_is_not_permitted() {
        let s = SwapStatus::Pending;
        assert!(matches!(
            s.apply(SwapAction::Accept, SwapParty::Requester),
            Err(TransitionError::NotPermitted { .. })
        ));
        assert!(matches!(
            s.apply(SwapAction::Cancel, SwapParty::Owner),
            Err(TransitionError::NotPermitted { .. })
        ));
    }

    #[test]
    fn either_party_completes_accepted_swap() {
        let s = SwapStatus::Accepted;
        assert_eq!(s.apply(SwapAction::Complete, SwapParty::Owner), Ok(SwapStatus::Completed));
        assert_eq!(s.apply(SwapAction::Complete, SwapParty::Requester), Ok(SwapStatus::Completed));
        assert!(s.apply(SwapAction::Cancel, SwapParty::Requester).is_err());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for status in SwapStatus::ALL.iter().copied().filter(|s| s.is_terminal()) {
            for action in SwapAction::ALL {
                for party in [SwapParty::Owner, SwapParty::Requester] {
                    assert!(status.apply(*action, party).is_err(), "{status} allowed {action}");
                }
            }
        }
    }

    #[test]
    fn condition_spelling() {
        assert_eq!("like_new".parse::<ItemCondition>(), Ok(ItemCondition::LikeNew));
        assert_eq!(ItemCondition::LikeNew.as_str(), "like_new");
        assert!("mint".parse::<ItemCondition>().is_err());
        assert_eq!(serde_json::to_string(&ItemCondition::LikeNew).unwrap(), "\"like_new\"");
    }
}
