use crate::card::Side;
use serde::{Deserialize, Serialize};

/// Lateralized stimulus flags as seen by the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusState {
    pub left_active: bool,
    pub right_active: bool,
    /// Clock timestamp (ns) of the most recent activation.
    pub activated_at_ns: Option<u64>,
}

impl StimulusState {
    pub fn is_active(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left_active,
            Side::Right => self.right_active,
        }
    }

    pub fn set(&mut self, side: Side, on: bool) {
        match side {
            Side::Left => self.left_active = on,
            Side::Right => self.right_active = on,
        }
    }

    pub fn any_active(&self) -> bool {
        self.left_active || self.right_active
    }
}
