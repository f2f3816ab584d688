use rigex_core::{Cue, DistanceCondition, RewardSize, TrialState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed session config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

fn positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive number, got {v}")))
    }
}

/// A seconds value that converts to a `Duration` (finite, not negative, in range).
fn duration_secs(field: &'static str, v: f64) -> Result<(), ConfigError> {
    Duration::try_from_secs_f64(v)
        .map(|_| ())
        .map_err(|err| invalid(field, format!("{v} s is not a usable duration: {err}")))
}

fn positive_secs(field: &'static str, v: f64) -> Result<(), ConfigError> {
    positive(field, v)?;
    duration_secs(field, v)
}

/// Per-state deadlines in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    pub initiate_s: f64,
    pub cue_s: f64,
    pub reward_s: f64,
}

impl Timeouts {
    pub fn for_state(&self, state: TrialState) -> Option<Duration> {
        match state {
            TrialState::Standby => None,
            TrialState::Initiate => Some(secs(self.initiate_s)),
            TrialState::CueState => Some(secs(self.cue_s)),
            TrialState::RewardAvailable => Some(secs(self.reward_s)),
        }
    }
}

/// Treadmill distances in cm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceTable {
    pub initiation: f64,
    pub short: f64,
    pub long: f64,
}

impl DistanceTable {
    pub fn required(&self, condition: DistanceCondition) -> f64 {
        match condition {
            DistanceCondition::Short => self.short,
            DistanceCondition::Long => self.long,
        }
    }
}

/// Pump volumes in µL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardVolumes {
    pub small: f64,
    pub large: f64,
}

impl RewardVolumes {
    pub fn volume(&self, size: RewardSize) -> f64 {
        match size {
            RewardSize::Small => self.small,
            RewardSize::Large => self.large,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    pub probability: f64,
    pub duration_s: f64,
    pub dark_period_times_s: Vec<f64>,
    pub inter_trial_s: f64,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            probability: 0.25,
            duration_s: 0.5,
            dark_period_times_s: vec![10.0, 20.0, 30.0],
            inter_trial_s: 1.0,
        }
    }
}

impl StimulusConfig {
    pub fn duration(&self) -> Duration {
        secs(self.duration_s)
    }

    pub fn inter_trial(&self) -> Duration {
        secs(self.inter_trial_s)
    }

    pub fn dark_period_times(&self) -> Vec<Duration> {
        self.dark_period_times_s.iter().map(|s| secs(*s)).collect()
    }
}

/// Session-loop policy: pacing, card drawing, block structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    pub tick_interval_ms: u64,
    pub punishment_timeout_s: f64,
    pub error_max: u32,
    pub block_duration: u32,
    pub initial_block: u8,
    pub cues: Vec<Cue>,
    pub distance_conditions: Vec<DistanceCondition>,
    pub max_trials: Option<u32>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            punishment_timeout_s: 1.0,
            error_max: 3,
            block_duration: 30,
            initial_block: 1,
            cues: vec![Cue::Sound, Cue::Led, Cue::SoundAndLed],
            distance_conditions: vec![DistanceCondition::Short, DistanceCondition::Long],
            max_trials: None,
        }
    }
}

impl SessionPolicy {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn punishment_timeout(&self) -> Duration {
        secs(self.punishment_timeout_s)
    }
}

fn default_lick_threshold() -> u32 {
    2
}

fn default_mouse_name() -> String {
    "test".to_string()
}

/// Everything the trial core reads. Loaded once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_mouse_name")]
    pub mouse_name: String,
    pub timeouts: Timeouts,
    pub distances: DistanceTable,
    pub reward_volume: RewardVolumes,
    #[serde(default = "default_lick_threshold")]
    pub lick_threshold: u32,
    #[serde(default)]
    pub stimulus: StimulusConfig,
    #[serde(default)]
    pub session: SessionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mouse_name: default_mouse_name(),
            timeouts: Timeouts {
                initiate_s: 120.0,
                cue_s: 120.0,
                reward_s: 60.0,
            },
            distances: DistanceTable {
                initiation: 10.0,
                short: 10.0,
                long: 20.0,
            },
            reward_volume: RewardVolumes {
                small: 5.0,
                large: 10.0,
            },
            lick_threshold: 1,
            stimulus: StimulusConfig::default(),
            session: SessionPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_secs("timeouts.initiate_s", self.timeouts.initiate_s)?;
        positive_secs("timeouts.cue_s", self.timeouts.cue_s)?;
        positive_secs("timeouts.reward_s", self.timeouts.reward_s)?;
        positive("distances.initiation", self.distances.initiation)?;
        positive("distances.short", self.distances.short)?;
        positive("distances.long", self.distances.long)?;

        for (field, v) in [
            ("reward_volume.small", self.reward_volume.small),
            ("reward_volume.large", self.reward_volume.large),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(invalid(field, format!("must be non-negative, got {v}")));
            }
        }

        if self.lick_threshold == 0 {
            return Err(invalid("lick_threshold", "must be at least 1"));
        }

        let p = self.stimulus.probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid("stimulus.probability", format!("{p} is outside [0, 1]")));
        }
        positive_secs("stimulus.duration_s", self.stimulus.duration_s)?;
        duration_secs("stimulus.inter_trial_s", self.stimulus.inter_trial_s)?;
        if self.stimulus.dark_period_times_s.is_empty() {
            return Err(invalid("stimulus.dark_period_times_s", "needs at least one duration"));
        }
        for t in &self.stimulus.dark_period_times_s {
            positive_secs("stimulus.dark_period_times_s", *t)?;
        }

        if self.session.tick_interval_ms == 0 {
            return Err(invalid("session.tick_interval_ms", "must be at least 1"));
        }
        duration_secs("session.punishment_timeout_s", self.session.punishment_timeout_s)?;
        if self.session.block_duration == 0 {
            return Err(invalid("session.block_duration", "must be at least 1"));
        }
        if !matches!(self.session.initial_block, 1 | 2) {
            return Err(invalid("session.initial_block", "must be 1 or 2"));
        }
        if self.session.cues.is_empty() {
            return Err(invalid("session.cues", "needs at least one cue"));
        }
        if self.session.distance_conditions.is_empty() {
            return Err(invalid("session.distance_conditions", "needs at least one condition"));
        }
        Ok(())
    }
}
