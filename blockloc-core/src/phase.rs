use std::fmt;

/// Defines session phases and their timing behaviour
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + fmt::Debug + Default {
    fn next(&self) -> Option<Self>;

    /// True once the session clock has been zeroed.
    fn is_clocked(&self) -> bool;

    /// True where each plan entry is an abort checkpoint.
    fn polls_abort(&self) -> bool {
        false
    }
}

/// The strictly ordered phases of one scanner run.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Instructions,
    WaitingForScanner,
    DummyScans,
    InitialRest,
    Main,
    Finished,
}

impl Phase for SessionPhase {
    fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Instructions => WaitingForScanner,
            WaitingForScanner => DummyScans,
            DummyScans => InitialRest,
            InitialRest => Main,
            Main => Finished,
            Finished => return None,
        })
    }

    fn is_clocked(&self) -> bool {
        matches!(self, Self::InitialRest | Self::Main)
    }

    fn polls_abort(&self) -> bool {
        matches!(self, Self::Main)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Instructions => "instructions",
            SessionPhase::WaitingForScanner => "waiting_for_scanner",
            SessionPhase::DummyScans => "dummy_scans",
            SessionPhase::InitialRest => "initial_rest",
            SessionPhase::Main => "main",
            SessionPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}
