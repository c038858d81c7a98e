pub mod stats;
pub mod timer;

pub use stats::{HoldSample, HoldStats};
pub use timer::{Clock, ManualClock, SessionClock, precise_sleep};
