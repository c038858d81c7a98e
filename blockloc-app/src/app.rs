use std::path::PathBuf;

use anyhow::{Context, Result};
use blockloc_experiment::{
    DirRecorder, ExperimentConfig, PresentationEngine, Recorder, Schedule, SessionFailure,
    SessionIdentity, SessionOutcome, SessionStatus, TriggerSource,
};
use blockloc_timing::SessionClock;
use clap::Parser;

use crate::console::ConsoleDisplay;
use crate::sigint::SigintAbort;

/// Block-design localizer run synchronized to the scanner trigger.
#[derive(Debug, Parser)]
#[command(name = "blockloc", version)]
pub struct Cli {
    /// Participant initials
    #[arg(long)]
    pub initials: String,

    /// Subject number
    #[arg(long)]
    pub subject: u32,

    /// Run number
    #[arg(long)]
    pub run: u32,

    /// JSON parameter file; built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory for output files
    #[arg(long, default_value = "Data")]
    pub data_dir: PathBuf,

    /// Schedule seed; defaults to subject + run
    #[arg(long)]
    pub seed: Option<u64>,
}

pub struct App {
    identity: SessionIdentity,
    schedule: Schedule,
    engine: PresentationEngine,
    recorder: DirRecorder,
    trigger: Box<dyn TriggerSource>,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self> {
        let identity = SessionIdentity::new(&cli.initials, cli.subject, cli.run)?;
        let config = match &cli.config {
            Some(path) => ExperimentConfig::from_path(path)
                .with_context(|| format!("loading parameters from {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        let seed = cli.seed.unwrap_or_else(|| identity.seed());
        let schedule = Schedule::from_config(&config, seed).context("generating trial schedule")?;
        let trigger = config.trigger.build().context("configuring scanner trigger")?;

        let mut recorder = DirRecorder::new(&cli.data_dir, &identity, &config.log_prefix)
            .with_context(|| {
                format!("creating output directory under {}", cli.data_dir.display())
            })?;
        recorder.record_config(&config)?;
        recorder.record_plan(schedule.entries())?;

        Ok(Self {
            identity,
            schedule,
            engine: PresentationEngine::new(config),
            recorder,
            trigger,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let config = self.engine.config();
        tracing::info!(
            subject = self.identity.subject,
            run = self.identity.run,
            seed = self.schedule.seed,
            planned_s = self.schedule.planned_length() + config.rest_duration(),
            "=== BLOCK LOCALIZER ==="
        );

        let mut clock = SessionClock::new();
        let mut display = ConsoleDisplay::stdout();
        let mut abort = SigintAbort::install()?;

        let result = self.engine.run(
            self.schedule.entries(),
            &mut clock,
            &mut self.trigger,
            &mut display,
            &mut abort,
        );
        let outcome = save_session(&mut self.recorder, result)?;

        match outcome.status {
            SessionStatus::Completed => tracing::info!("experiment completed"),
            SessionStatus::Aborted { entries_executed } => tracing::warn!(
                entries_executed,
                planned = self.schedule.len(),
                "experiment terminated by user"
            ),
            SessionStatus::Failed { entries_executed } => tracing::error!(
                entries_executed,
                planned = self.schedule.len(),
                "experiment failed"
            ),
        }
        tracing::info!("output files saved to {}", self.recorder.dir().display());
        Ok(())
    }
}

/// Records whatever the run captured, aborted and failed runs included,
/// then hands back the outcome or the run's error.
fn save_session<R: Recorder>(
    recorder: &mut R,
    result: std::result::Result<SessionOutcome, SessionFailure>,
) -> Result<SessionOutcome> {
    match result {
        Ok(outcome) => {
            recorder.record_session(&outcome)?;
            Ok(outcome)
        }
        Err(failure) => {
            if let Err(e) = recorder.record_session(&failure.partial) {
                tracing::error!(error = %e, "could not save the partial session");
            }
            Err(anyhow::Error::new(failure).context("running session"))
        }
    }
}
