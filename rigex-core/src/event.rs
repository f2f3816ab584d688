use crate::card::Side;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Discrete hardware event as delivered by the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HwEvent {
    /// IR beam break at the left lick port.
    LeftEntry,
    /// IR beam break at the right lick port.
    RightEntry,
    LeftPatch,
    RightPatch,
    KeyPress(char),
}

impl HwEvent {
    pub fn lick(side: Side) -> Self {
        match side {
            Side::Left => HwEvent::LeftEntry,
            Side::Right => HwEvent::RightEntry,
        }
    }

    /// Side of a lick-port event, `None` for anything else.
    pub fn lick_side(&self) -> Option<Side> {
        match self {
            HwEvent::LeftEntry => Some(Side::Left),
            HwEvent::RightEntry => Some(Side::Right),
            _ => None,
        }
    }

    pub fn patch_side(&self) -> Option<Side> {
        match self {
            HwEvent::LeftPatch => Some(Side::Left),
            HwEvent::RightPatch => Some(Side::Right),
            _ => None,
        }
    }

    /// Session-control events are handled every tick, whatever the trial state.
    pub fn is_session_control(&self) -> bool {
        matches!(
            self,
            HwEvent::KeyPress(_) | HwEvent::LeftPatch | HwEvent::RightPatch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("unknown hardware signal `{0}`")]
    Unknown(String),
    #[error("empty key signal")]
    EmptyKey,
}

impl FromStr for HwEvent {
    type Err = SignalError;

    /// Decodes the named signals emitted by the GPIO layer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left_IR_entry" => Ok(HwEvent::LeftEntry),
            "right_IR_entry" => Ok(HwEvent::RightEntry),
            "left_patch" => Ok(HwEvent::LeftPatch),
            "right_patch" => Ok(HwEvent::RightPatch),
            other => match other.strip_prefix("key:") {
                Some(rest) => rest
                    .chars()
                    .next()
                    .map(HwEvent::KeyPress)
                    .ok_or(SignalError::EmptyKey),
                None => Err(SignalError::Unknown(other.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_signals() {
        assert_eq!("left_IR_entry".parse::<HwEvent>(), Ok(HwEvent::LeftEntry));
        assert_eq!("right_patch".parse::<HwEvent>(), Ok(HwEvent::RightPatch));
        assert_eq!("key:q".parse::<HwEvent>(), Ok(HwEvent::KeyPress('q')));
    }

    #[test]
    fn rejects_third_side() {
        assert_eq!(
            "center_IR_entry".parse::<HwEvent>(),
            Err(SignalError::Unknown("center_IR_entry".into()))
        );
        assert_eq!("key:".parse::<HwEvent>(), Err(SignalError::EmptyKey));
    }
}
