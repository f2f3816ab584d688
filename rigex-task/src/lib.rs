pub mod config;
pub mod controller;
pub mod deck;
pub mod events;
pub mod hardware;
pub mod log;
pub mod machine;
pub mod session;
pub mod sim;
pub mod stimulus;
pub mod timeout;

pub use config::{ConfigError, SessionConfig};
pub use controller::{SetupError, TickOutcome, TrialController};
pub use deck::CardDeck;
pub use events::{EventQueue, EventSource, TickEvents};
pub use hardware::{
    CueActuator, LocomotionSensor, RewardActuator, Rig, StimulusRenderer, VideoRecorder,
};
pub use log::{LogCategory, LogRecord, MemoryLog, TracingLog, TrialLog};
pub use machine::{MachineError, TransitionTable, TrialContext, TrialData, TrialStateMachine};
pub use session::{SessionRunner, SessionSummary};
pub use stimulus::{PeriodCounters, StimulusScheduler};
pub use timeout::TimeoutScheduler;
