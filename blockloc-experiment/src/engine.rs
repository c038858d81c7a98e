use std::time::Duration;

use blockloc_core::{
    Condition, Countdown, OnsetIndex, ParadigmError, Phase, Result, RuntimeLogRecord, ScheduleEntry,
    Screen, SessionPhase, TrialLabel,
};
use blockloc_timing::{Clock, HoldSample, HoldStats};

use crate::abort::AbortSignal;
use crate::config::ExperimentConfig;
use crate::display::Display;
use crate::trigger::TriggerSource;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Completed,
    /// The operator aborted before plan entry `entries_executed` started.
    Aborted { entries_executed: usize },
    /// An error stopped the run during plan entry `entries_executed`.
    Failed { entries_executed: usize },
}

/// Everything a run produced, ready for the recorder.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub log: Vec<RuntimeLogRecord>,
    pub onsets: OnsetIndex,
    pub status: SessionStatus,
    pub timing: HoldStats,
}

impl SessionOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, SessionStatus::Aborted { .. })
    }
}

/// A run stopped by an error. `partial` holds every record captured before
/// the error, so it can still be saved.
#[derive(Debug, thiserror::Error)]
#[error("session failed during {phase}")]
pub struct SessionFailure {
    pub phase: SessionPhase,
    pub partial: SessionOutcome,
    #[source]
    pub source: ParadigmError,
}

/// Walks a schedule against real time.
pub struct PresentationEngine {
    config: ExperimentConfig,
}

/// Mutable state owned by one `run`.
struct Session {
    phase: SessionPhase,
    log: Vec<RuntimeLogRecord>,
    onsets: OnsetIndex,
    samples: Vec<HoldSample>,
    executed: usize,
}

impl Session {
    fn advance_phase(&mut self) {
        if let Some(next) = self.phase.next() {
            self.enter(next);
        }
    }

    fn enter(&mut self, next: SessionPhase) {
        tracing::info!(from = %self.phase, to = %next, "session phase");
        self.phase = next;
    }

    fn record(&mut self, record: RuntimeLogRecord) {
        tracing::debug!(
            block = record.block,
            trial = %record.trial,
            condition = %record.condition,
            onset = record.onset,
            duration = record.duration,
            "presented"
        );
        self.onsets.push(&record.condition, record.onset);
        self.log.push(record);
    }
}

impl PresentationEngine {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Runs one session.
    ///
    /// The clock is reset exactly once, after the trigger and dummy scans,
    /// and every recorded onset is relative to that instant. Abort is checked
    /// at the start of each pre-roll phase and polled before each plan entry;
    /// an abort leaves every record captured so far and adds none for the
    /// entry it preempted. An error returns the records captured before it
    /// inside the [`SessionFailure`].
    pub fn run<C, T, D, A>(
        &self,
        plan: &[ScheduleEntry],
        clock: &mut C,
        trigger: &mut T,
        display: &mut D,
        abort: &mut A,
    ) -> std::result::Result<SessionOutcome, SessionFailure>
    where
        C: Clock + ?Sized,
        T: TriggerSource + ?Sized,
        D: Display + ?Sized,
        A: AbortSignal + ?Sized,
    {
        let mut session = Session {
            phase: SessionPhase::default(),
            log: Vec::with_capacity(plan.len() + 1),
            onsets: OnsetIndex::new(self.config.conditions.iter().map(String::as_str)),
            samples: Vec::with_capacity(plan.len()),
            executed: 0,
        };
        tracing::info!(entries = plan.len(), trigger = %trigger.describe(), "starting session");

        match self.drive(&mut session, plan, clock, trigger, display, abort) {
            Ok(status) => {
                session.enter(SessionPhase::Finished);
                Ok(self.finish(session, status))
            }
            Err(source) => {
                let phase = session.phase;
                let entries_executed = session.executed;
                tracing::error!(
                    %phase,
                    entries_executed,
                    records = session.log.len(),
                    error = %source,
                    "session failed"
                );
                let partial = self.finish(session, SessionStatus::Failed { entries_executed });
                Err(SessionFailure {
                    phase,
                    partial,
                    source,
                })
            }
        }
    }

    fn drive<C, T, D, A>(
        &self,
        session: &mut Session,
        plan: &[ScheduleEntry],
        clock: &mut C,
        trigger: &mut T,
        display: &mut D,
        abort: &mut A,
    ) -> Result<SessionStatus>
    where
        C: Clock + ?Sized,
        T: TriggerSource + ?Sized,
        D: Display + ?Sized,
        A: AbortSignal + ?Sized,
    {
        let aborted = SessionStatus::Aborted { entries_executed: 0 };

        // Pre-roll, before the clock runs.
        if pre_roll_aborted(session, abort) {
            return Ok(aborted);
        }
        display.present(
            &Screen::Instructions {
                text: self.config.instruction_text.clone(),
            },
            secs(self.config.instruction_duration()),
        )?;
        session.advance_phase();
        display.present(&Screen::WaitingForScanner, Duration::ZERO)?;
        trigger.await_trigger()?;
        session.advance_phase();

        if pre_roll_aborted(session, abort) {
            return Ok(aborted);
        }
        if self.config.trs_dummy_scans > 0 {
            let fixation = Screen::Fixation {
                text: "REST".to_owned(),
            };
            for _ in 0..self.config.trs_dummy_scans {
                display.present(&fixation, secs(self.config.tr))?;
            }
        }
        if pre_roll_aborted(session, abort) {
            return Ok(aborted);
        }

        clock.reset();
        session.advance_phase();
        debug_assert!(session.phase.is_clocked());

        let rest_duration = self.config.rest_duration();
        let onset = clock.now();
        self.hold(display, &Condition::Rest, rest_duration)?;
        let initial = RuntimeLogRecord {
            block: 0,
            trial: TrialLabel::InitialRest,
            condition: Condition::Rest,
            onset,
            duration: clock.now() - onset,
        };
        session.record(initial);
        session.advance_phase();

        for entry in plan {
            let executed = session.executed;
            if session.phase.polls_abort() && abort.poll() {
                tracing::warn!(
                    executed,
                    remaining = plan.len() - executed,
                    "experiment terminated by user"
                );
                return Ok(SessionStatus::Aborted {
                    entries_executed: executed,
                });
            }

            let onset = clock.now();
            self.hold(display, &entry.condition, entry.planned_duration)?;
            let duration = clock.now() - onset;

            session.samples.push(HoldSample {
                planned_duration: entry.planned_duration,
                measured_duration: duration,
                drift: onset - (rest_duration + entry.planned_onset),
            });
            session.record(RuntimeLogRecord::for_entry(entry, onset, duration));
            session.executed += 1;
        }
        Ok(SessionStatus::Completed)
    }

    fn finish(&self, session: Session, status: SessionStatus) -> SessionOutcome {
        let timing = HoldStats::from_samples(&session.samples);
        self.report(&timing);
        SessionOutcome {
            log: session.log,
            onsets: session.onsets,
            status,
            timing,
        }
    }

    /// Holds a condition or rest screen for `total` seconds, split evenly
    /// over the countdown frames. Frame boundaries are computed on the
    /// cumulative total so the frames always sum to `total`.
    fn hold<D: Display + ?Sized>(
        &self,
        display: &mut D,
        condition: &Condition,
        total: f64,
    ) -> Result<()> {
        let frames = self.config.countdown_frames.max(1);
        let total_ns = secs(total).as_nanos();
        let mut shown_ns = 0u128;
        for frame in 1..=frames {
            let boundary = total_ns * frame as u128 / frames as u128;
            let countdown = Countdown { frame, of: frames };
            let screen = match condition {
                Condition::Rest => Screen::Rest { countdown },
                Condition::Named(name) => Screen::Condition {
                    label: format!("{} {}", self.config.condition_prefix, name),
                    countdown,
                },
            };
            display.present(&screen, Duration::from_nanos((boundary - shown_ns) as u64))?;
            shown_ns = boundary;
        }
        Ok(())
    }

    fn report(&self, timing: &HoldStats) {
        tracing::info!(
            holds = timing.samples,
            mean_error_ms = timing.mean_error * 1e3,
            jitter_ms = timing.jitter * 1e3,
            max_drift_ms = timing.max_abs_drift * 1e3,
            "session timing"
        );
        if timing.max_abs_drift > self.config.tr {
            tracing::warn!(
                max_drift_s = timing.max_abs_drift,
                tr = self.config.tr,
                "onsets drifted more than one TR from the plan"
            );
        }
    }
}

/// Abort check at the start of a pre-roll phase. Not counted as a
/// per-entry poll.
fn pre_roll_aborted<A: AbortSignal + ?Sized>(session: &Session, abort: &mut A) -> bool {
    if session.phase.is_clocked() || !abort.poll_pre_roll() {
        return false;
    }
    tracing::warn!(
        phase = %session.phase,
        "experiment terminated by user before the clock started"
    );
    true
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}
