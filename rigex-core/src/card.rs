use serde::{Deserialize, Serialize};

/// Lick port / patch side. The rig only has two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Pump port wired to this side.
    pub fn port(self) -> u8 {
        match self {
            Side::Left => 1,
            Side::Right => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cue {
    #[serde(rename = "sound")]
    Sound,
    #[serde(rename = "LED")]
    Led,
    /// Free choice: either port is rewarded.
    #[serde(rename = "sound+LED")]
    SoundAndLed,
}

impl Cue {
    pub fn is_free_choice(&self) -> bool {
        matches!(self, Cue::SoundAndLed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Sound => "sound",
            Cue::Led => "LED",
            Cue::SoundAndLed => "sound+LED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardSize {
    Small,
    Large,
}

impl RewardSize {
    pub fn inverted(self) -> Self {
        match self {
            RewardSize::Small => RewardSize::Large,
            RewardSize::Large => RewardSize::Small,
        }
    }
}

/// Key into the session distance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceCondition {
    Short,
    Long,
}

/// Per-trial configuration, fixed from `Initiate` entry until the trial ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCard {
    pub cue: Cue,
    pub distance: DistanceCondition,
    pub correct_side: Side,
    pub reward: RewardSize,
}

impl TrialCard {
    pub fn new(
        cue: Cue,
        distance: DistanceCondition,
        correct_side: Side,
        reward: RewardSize,
    ) -> Self {
        Self {
            cue,
            distance,
            correct_side,
            reward,
        }
    }

    /// Whether a lick on `side` takes the rewarded path for this card.
    pub fn rewards(&self, side: Side) -> bool {
        self.cue.is_free_choice() || side == self.correct_side
    }

    /// Reward class dispensed for a first lick on `side`.
    ///
    /// Free-choice cards invert the nominal class when the animal picks the
    /// side opposite the nominal one.
    pub fn reward_for(&self, side: Side) -> RewardSize {
        if self.cue.is_free_choice() && side != self.correct_side {
            self.reward.inverted()
        } else {
            self.reward
        }
    }
}
