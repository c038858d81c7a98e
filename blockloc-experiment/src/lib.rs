pub mod abort;
pub mod config;
pub mod display;
pub mod engine;
pub mod identity;
pub mod record;
pub mod schedule;
pub mod trigger;

pub use abort::{AbortFlag, AbortSignal, NeverAbort};
pub use config::{ExperimentConfig, TriggerConfig};
pub use display::Display;
pub use engine::{PresentationEngine, SessionFailure, SessionOutcome, SessionStatus};
pub use identity::SessionIdentity;
pub use record::{DirRecorder, Recorder};
pub use schedule::{Schedule, generate, session_seed};
pub use trigger::{KeyTrigger, ParallelPortTrigger, SerialPortTrigger, TriggerSource};
