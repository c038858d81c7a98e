use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic session clock, in seconds.
///
/// `reset` zeroes the clock; every later `now` is relative to that instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
    fn reset(&mut self);
}

/// Wall clock backed by `Instant`.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SessionClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn reset(&mut self) {
        self.start = Instant::now();
    }
}

/// Sleeps for `duration` against the monotonic clock.
pub fn precise_sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{CLOCK_MONOTONIC, EINTR, TIMER_ABSTIME, clock_gettime, clock_nanosleep, timespec};

    // Absolute deadline so a signal interruption resumes without drift.
    let mut deadline = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        clock_gettime(CLOCK_MONOTONIC, &mut deadline);
    }
    let nanos = deadline.tv_nsec as u64 + duration.subsec_nanos() as u64;
    deadline.tv_sec += duration.as_secs() as libc::time_t + (nanos / 1_000_000_000) as libc::time_t;
    deadline.tv_nsec = (nanos % 1_000_000_000) as libc::c_long;

    loop {
        let rc = unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &deadline, std::ptr::null_mut())
        };
        if rc != EINTR {
            break;
        }
    }
}

/// Clock driven by hand, for deterministic runs.
///
/// Clones share the same time line, so a test display can advance the clock
/// the engine reads.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks_ns: Arc<AtomicU64>,
    origin_ns: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.ticks_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    /// Time since construction, ignoring resets.
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.ticks_ns.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        let ticks = self.ticks_ns.load(Ordering::SeqCst);
        Duration::from_nanos(ticks.saturating_sub(self.origin_ns)).as_secs_f64()
    }

    fn reset(&mut self) {
        self.origin_ns = self.ticks_ns.load(Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_resets_to_zero() {
        let mut clock = ManualClock::new();
        let display_side = clock.clone();
        display_side.advance_secs(7.5);
        assert_eq!(clock.now(), 7.5);

        clock.reset();
        assert_eq!(clock.now(), 0.0);
        display_side.advance_secs(1.25);
        assert_eq!(clock.now(), 1.25);
        assert_eq!(clock.total(), Duration::from_millis(8750));
    }

    #[test]
    fn session_clock_is_monotonic() {
        let mut clock = SessionClock::new();
        precise_sleep(Duration::from_millis(2));
        let before = clock.now();
        assert!(before >= 0.002);
        clock.reset();
        let after = clock.now();
        assert!(after < before);
        assert!(clock.now() >= after);
    }

    #[test]
    fn precise_sleep_waits_at_least_requested() {
        let start = Instant::now();
        precise_sleep(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
