pub mod clock;
pub mod driver;
pub mod schedule;
pub mod stats;

pub use clock::{Clock, HighPrecisionTimer, ManualClock, nanos};
pub use driver::Ticker;
pub use schedule::{Expired, Schedule, TimerHandle};
pub use stats::{TickRecorder, TickStats};
