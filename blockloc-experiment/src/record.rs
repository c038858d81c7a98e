use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use blockloc_core::{Condition, ParadigmError, Result, ScheduleEntry, table};

use crate::config::ExperimentConfig;
use crate::engine::SessionOutcome;
use crate::identity::SessionIdentity;

/// Persistence sink for a session's artifacts.
pub trait Recorder {
    fn record_config(&mut self, _config: &ExperimentConfig) -> Result<()> {
        Ok(())
    }

    /// Called once, before the session starts.
    fn record_plan(&mut self, plan: &[ScheduleEntry]) -> Result<()>;

    /// Called once after the run, aborted or not.
    fn record_session(&mut self, outcome: &SessionOutcome) -> Result<()>;
}

/// Writes every artifact of a run into `<root>/sub-<subject>_<initials>/`.
#[derive(Debug, Clone)]
pub struct DirRecorder {
    dir: PathBuf,
    identity: SessionIdentity,
    datetag: String,
    log_prefix: String,
}

impl DirRecorder {
    pub fn new(
        root: impl AsRef<Path>,
        identity: &SessionIdentity,
        log_prefix: &str,
    ) -> Result<Self> {
        let datetag = chrono::Local::now().format("%Y_%m_%d_%H_%M").to_string();
        Self::with_datetag(root, identity, log_prefix, &datetag)
    }

    pub fn with_datetag(
        root: impl AsRef<Path>,
        identity: &SessionIdentity,
        log_prefix: &str,
        datetag: &str,
    ) -> Result<Self> {
        let dir = root
            .as_ref()
            .join(format!("sub-{}_{}", identity.subject, identity.initials));
        fs::create_dir_all(&dir).map_err(ParadigmError::Record)?;
        Ok(Self {
            dir,
            identity: identity.clone(),
            datetag: datetag.to_owned(),
            log_prefix: log_prefix.to_owned(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn run_prefix(&self) -> String {
        format!("sub-{}_run-{}", self.identity.subject, self.identity.run)
    }

    pub fn parameters_path(&self) -> PathBuf {
        self.dir.join(format!("parameters_{}.json", self.datetag))
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_trial_schedule_{}.csv", self.run_prefix(), self.datetag))
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_presentation_order_{}.txt", self.run_prefix(), self.datetag))
    }

    pub fn onset_path(&self, condition: &Condition) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.1D", self.run_prefix(), condition, self.datetag))
    }

    pub fn event_log_path(&self) -> PathBuf {
        let id = &self.identity;
        self.dir.join(format!(
            "{}_sub-{}_{}_run{}_{}.csv",
            self.log_prefix, id.subject, id.initials, id.run, self.datetag
        ))
    }
}

fn write_file<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut out = BufWriter::new(File::create(path).map_err(ParadigmError::Record)?);
    body(&mut out)
        .and_then(|()| out.flush())
        .map_err(ParadigmError::Record)?;
    tracing::debug!(path = %path.display(), "wrote");
    Ok(())
}

impl Recorder for DirRecorder {
    fn record_config(&mut self, config: &ExperimentConfig) -> Result<()> {
        let json = config.to_json_pretty();
        write_file(&self.parameters_path(), |w| w.write_all(json.as_bytes()))
    }

    fn record_plan(&mut self, plan: &[ScheduleEntry]) -> Result<()> {
        write_file(&self.schedule_path(), |w| table::write_schedule(w, plan))?;
        write_file(&self.transcript_path(), |w| table::write_transcript(w, plan))
    }

    fn record_session(&mut self, outcome: &SessionOutcome) -> Result<()> {
        for (condition, onsets) in outcome.onsets.presented() {
            let line = table::format_onsets(onsets);
            write_file(&self.onset_path(condition), |w| w.write_all(line.as_bytes()))?;
        }
        write_file(&self.event_log_path(), |w| table::write_event_log(w, &outcome.log))?;
        tracing::info!(
            dir = %self.dir.display(),
            records = outcome.log.len(),
            "output files saved"
        );
        Ok(())
    }
}
