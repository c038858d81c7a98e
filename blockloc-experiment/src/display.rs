use std::time::Duration;

use blockloc_core::{Result, Screen};

/// Presentation sink.
///
/// `present` shows `screen` and returns once `hold` has elapsed. A zero hold
/// shows the screen and returns immediately.
pub trait Display {
    fn present(&mut self, screen: &Screen, hold: Duration) -> Result<()>;
}

impl<D: Display + ?Sized> Display for &mut D {
    fn present(&mut self, screen: &Screen, hold: Duration) -> Result<()> {
        (**self).present(screen, hold)
    }
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn present(&mut self, screen: &Screen, hold: Duration) -> Result<()> {
        (**self).present(screen, hold)
    }
}
