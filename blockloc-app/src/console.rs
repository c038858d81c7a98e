use std::io::{self, Stdout, Write};
use std::time::Duration;

use blockloc_core::{ParadigmError, Result, Screen};
use blockloc_experiment::Display;
use blockloc_timing::precise_sleep;

/// Text display on a terminal. Each screen is one line; countdown frames
/// show the number of frames left.
pub struct ConsoleDisplay<W: Write = Stdout> {
    out: W,
    clear: bool,
}

impl ConsoleDisplay<Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: io::stdout(),
            clear: true,
        }
    }
}

impl<W: Write> ConsoleDisplay<W> {
    #[cfg(test)]
    fn plain(out: W) -> Self {
        Self { out, clear: false }
    }

    fn draw(&mut self, screen: &Screen) -> io::Result<()> {
        if self.clear {
            write!(self.out, "\x1b[2J\x1b[H")?;
        }
        match screen.countdown() {
            Some(countdown) => {
                let left = countdown.remaining() + 1;
                writeln!(self.out, "[{left:>2}] {}", screen.text())?
            }
            None => writeln!(self.out, "{}", screen.text())?,
        }
        self.out.flush()
    }
}

impl<W: Write> Display for ConsoleDisplay<W> {
    fn present(&mut self, screen: &Screen, hold: Duration) -> Result<()> {
        self.draw(screen).map_err(ParadigmError::Display)?;
        precise_sleep(hold);
        Ok(())
    }
}
