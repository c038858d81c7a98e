use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Operator abort, polled by the engine at its checkpoints.
pub trait AbortSignal {
    /// Checked before each plan entry. Must not block.
    fn poll(&mut self) -> bool;

    /// Checked at the start of each pre-roll phase, before the clock starts.
    /// These checks do not count as `poll` calls.
    fn poll_pre_roll(&mut self) -> bool {
        false
    }
}

impl<F: FnMut() -> bool> AbortSignal for F {
    fn poll(&mut self) -> bool {
        self()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn poll(&mut self) -> bool {
        false
    }
}

/// Shared flag that any thread can raise.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl AbortSignal for AbortFlag {
    fn poll(&mut self) -> bool {
        self.is_raised()
    }

    fn poll_pre_roll(&mut self) -> bool {
        self.is_raised()
    }
}
