use crate::card::{RewardSize, Side, TrialCard};
use crate::counters::ChoiceError;
use serde::{Deserialize, Serialize};

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialOutcome {
    Rewarded { side: Side, size: RewardSize },
    InitiateTimeout,
    CueTimeout,
    Choice(ChoiceError),
    /// Session ended before the trial resolved.
    Aborted,
}

impl TrialOutcome {
    pub fn is_error(&self) -> bool {
        !matches!(self, TrialOutcome::Rewarded { .. })
    }
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: u32,
    pub card: TrialCard,
    pub outcome: TrialOutcome,
    pub lick_count: u32,
    pub timestamp_ns: u64,
}
