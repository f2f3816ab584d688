use crate::card::Side;
use serde::{Deserialize, Serialize};

/// Reward-phase error. A trial carries at most one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChoiceError {
    WrongChoice,
    NoChoice,
    MultipleChoice,
}

impl ChoiceError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceError::WrongChoice => "wrong_choice_error",
            ChoiceError::NoChoice => "no_choice_error",
            ChoiceError::MultipleChoice => "multiple_choice_error",
        }
    }
}

/// Soft error flags for the running trial.
///
/// A flag only turns into a counted error when it is promoted on state exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFlags {
    pub initiate_error: bool,
    pub cue_state_error: bool,
    pub reward_error: bool,
    /// Pending reward-phase error; a newer classification replaces an older one.
    pub choice: Option<ChoiceError>,
    /// Sticky: the session loop reuses the card when this is set at `Standby`.
    pub error_repeat: bool,
}

impl ErrorFlags {
    pub fn wrong_choice_error(&self) -> bool {
        self.choice == Some(ChoiceError::WrongChoice)
    }

    pub fn no_choice_error(&self) -> bool {
        self.choice == Some(ChoiceError::NoChoice)
    }

    pub fn multiple_choice_error(&self) -> bool {
        self.choice == Some(ChoiceError::MultipleChoice)
    }

    pub fn mark_choice(&mut self, err: ChoiceError) {
        self.reward_error = true;
        self.choice = Some(err);
        self.error_repeat = true;
    }
}

/// Committed errors by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub initiate: u32,
    pub cue_state: u32,
    pub wrong_choice: u32,
    pub no_choice: u32,
    pub multiple_choice: u32,
}

impl ErrorCounts {
    pub fn total(&self) -> u32 {
        self.initiate + self.cue_state + self.wrong_choice + self.no_choice + self.multiple_choice
    }

    pub fn add_choice(&mut self, err: ChoiceError) {
        match err {
            ChoiceError::WrongChoice => self.wrong_choice += 1,
            ChoiceError::NoChoice => self.no_choice += 1,
            ChoiceError::MultipleChoice => self.multiple_choice += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub trial_number: u32,
    pub errors: ErrorCounts,
    pub total_reward: u32,
    pub lick_count: u32,
    /// Side of the first credited lick in the current trial.
    pub side_buffer: Option<Side>,
    /// Sensor-consistency faults (distance resets, undecodable signals).
    pub sensor_faults: u32,
}

impl SessionCounters {
    pub fn error_count(&self) -> u32 {
        self.errors.total()
    }

    /// Per-trial fields, cleared on every `Standby` entry.
    pub fn reset_trial(&mut self) {
        self.lick_count = 0;
        self.side_buffer = None;
    }
}
