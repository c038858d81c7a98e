use serde::{Deserialize, Serialize};

/// Position within a countdown sequence, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub frame: usize,
    pub of: usize,
}

impl Countdown {
    pub fn remaining(&self) -> usize {
        self.of - self.frame
    }
}

/// What the display should show for one hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Screen {
    Instructions { text: String },
    WaitingForScanner,
    /// Neutral screen used to absorb dummy volumes.
    Fixation { text: String },
    Rest { countdown: Countdown },
    Condition { label: String, countdown: Countdown },
}

impl Screen {
    pub fn text(&self) -> &str {
        match self {
            Screen::Instructions { text } | Screen::Fixation { text } => text,
            Screen::WaitingForScanner => "Waiting for scanner",
            Screen::Rest { .. } => "REST",
            Screen::Condition { label, .. } => label,
        }
    }

    pub fn countdown(&self) -> Option<Countdown> {
        match self {
            Screen::Rest { countdown } | Screen::Condition { countdown, .. } => Some(*countdown),
            _ => None,
        }
    }
}
