pub mod error;
pub mod onsets;
pub mod phase;
pub mod stimulus;
pub mod table;
pub mod trial;

pub use error::{ParadigmError, Result};
pub use onsets::OnsetIndex;
pub use phase::{Phase, SessionPhase};
pub use stimulus::{Countdown, Screen};
pub use trial::{Condition, RuntimeLogRecord, ScheduleEntry, TrialLabel};
