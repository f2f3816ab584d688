pub mod card;
pub mod counters;
pub mod event;
pub mod state;
pub mod stimulus;
pub mod trial;

pub use card::{Cue, DistanceCondition, RewardSize, Side, TrialCard};
pub use counters::{ChoiceError, ErrorCounts, ErrorFlags, SessionCounters};
pub use event::{HwEvent, SignalError};
pub use state::{Trigger, TrialState};
pub use stimulus::StimulusState;
pub use trial::{TrialOutcome, TrialResult};
