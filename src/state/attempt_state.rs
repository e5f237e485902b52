/// Retry state machine for one (item, strategy) attempt sequence
use std::fmt;

/// Represents the current state of a strategy attempt sequence
///
/// ```text
/// Idle → Attempting → Succeeded
///            ↓  ↑
///          Retrying
///            ↓
///        Exhausted | TerminalFailure | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    // ===== Active States =====
    /// No attempt has been made yet
    Idle,

    /// The strategy is being invoked
    Attempting,

    /// Sleeping before the next attempt
    Retrying,

    // ===== Terminal States =====
    /// The strategy produced a payload
    Succeeded,

    /// Every allowed attempt failed with a retryable error
    Exhausted,

    /// The content is definitively absent; not retried
    TerminalFailure,

    /// An external cancellation stopped the sequence
    Cancelled,
}

impl AttemptState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Attempting | Self::Retrying)
    }

    /// Returns true if this transition is allowed by the state machine
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        match (self, next) {
            (Idle, Attempting) | (Idle, Cancelled) => true,
            (Attempting, Succeeded)
            | (Attempting, Retrying)
            | (Attempting, Exhausted)
            | (Attempting, TerminalFailure)
            | (Attempting, Cancelled) => true,
            (Retrying, Attempting) | (Retrying, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::TerminalFailure => "terminal_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
