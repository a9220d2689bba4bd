//! Logical valve position.

use core::fmt;

/// Commanded position of the gas shut-off valve.
///
/// `Closed` is the safety default: it is what the firmware assumes when
/// nothing better is known (fresh flash, unreadable store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValveState {
    Open,
    #[default]
    Closed,
}

impl ValveState {
    /// Map the supervisor's `is_open` flag onto a valve state.
    pub const fn from_is_open(is_open: bool) -> Self {
        if is_open { Self::Open } else { Self::Closed }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}
