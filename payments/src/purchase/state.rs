//! States of one purchase attempt.
//!
//! ```text
//! Idle -> Disconnecting -> Connecting -> Verifying -> Building -> Submitting -> Paid
//!   \___________\______________\____________\____________\____________\______-> Failed
//! ```

use std::fmt;

use serde::Serialize;

/// Where a purchase attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    /// Not started.
    Idle,
    /// Tearing down any previous wallet session and its artifacts.
    Disconnecting,
    /// Waiting for the user to connect a wallet.
    Connecting,
    /// Resolving the jetton wallet and checking balances.
    Verifying,
    /// Building the transfer message.
    Building,
    /// Waiting for the user to sign.
    Submitting,
    /// The wallet confirmed the transaction.
    Paid,
    /// The attempt ended without payment.
    Failed,
}

impl PurchaseState {
    /// The next state on the success path, `None` once terminal.
    pub fn next(self) -> Option<Self> {
        use PurchaseState::*;
        match self {
            Idle => Some(Disconnecting),
            Disconnecting => Some(Connecting),
            Connecting => Some(Verifying),
            Verifying => Some(Building),
            Building => Some(Submitting),
            Submitting => Some(Paid),
            Paid | Failed => None,
        }
    }

    /// `Paid` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PurchaseState::Paid | PurchaseState::Failed)
    }

    /// Whether the user should be kept from starting another attempt.
    pub fn is_busy(self) -> bool {
        !self.is_terminal() && self != PurchaseState::Idle
    }

    /// Valid moves: one step along the success path, or to `Failed` from any
    /// non-terminal state.
    pub fn can_transition_to(self, next: Self) -> bool {
        if next == PurchaseState::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(next)
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurchaseState::Idle => "idle",
            PurchaseState::Disconnecting => "disconnecting",
            PurchaseState::Connecting => "connecting",
            PurchaseState::Verifying => "verifying",
            PurchaseState::Building => "building",
            PurchaseState::Submitting => "submitting",
            PurchaseState::Paid => "paid",
            PurchaseState::Failed => "failed",
        };
        f.write_str(name)
    }
}
