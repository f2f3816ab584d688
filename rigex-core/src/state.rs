use serde::{Deserialize, Serialize};

/// Trial phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrialState {
    #[default]
    Standby,
    Initiate,
    CueState,
    RewardAvailable,
}

impl TrialState {
    pub const ALL: [TrialState; 4] = [
        TrialState::Standby,
        TrialState::Initiate,
        TrialState::CueState,
        TrialState::RewardAvailable,
    ];

    /// Position in state-indexed tables.
    pub fn index(self) -> usize {
        match self {
            TrialState::Standby => 0,
            TrialState::Initiate => 1,
            TrialState::CueState => 2,
            TrialState::RewardAvailable => 3,
        }
    }

    /// Every state except `Standby` runs against a deadline.
    pub fn is_timed(&self) -> bool {
        !matches!(self, TrialState::Standby)
    }

    pub fn is_standby(&self) -> bool {
        matches!(self, TrialState::Standby)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialState::Standby => "standby",
            TrialState::Initiate => "initiate",
            TrialState::CueState => "cue_state",
            TrialState::RewardAvailable => "reward_available",
        }
    }
}

impl std::fmt::Display for TrialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    StartTrial,
    StartCue,
    EvaluateReward,
    Restart,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::StartTrial => "start_trial",
            Trigger::StartCue => "start_cue",
            Trigger::EvaluateReward => "evaluate_reward",
            Trigger::Restart => "restart",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
