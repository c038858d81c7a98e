use std::collections::HashSet;
use std::path::Path;

use blockloc_core::trial::REST;
use blockloc_core::{ParadigmError, Result};
use serde::{Deserialize, Serialize};

/// How the scanner announces the start of acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum TriggerConfig {
    /// A character arriving on standard input (button box or keyboard).
    Key { value: String },
    /// A status pin of a parallel port device, e.g. `/dev/parport0`.
    Parallel {
        address: Option<String>,
        #[serde(default = "default_parallel_pin")]
        pin: u8,
    },
    /// A byte sequence on a serial line, e.g. `/dev/ttyUSB0`.
    Serial {
        port: Option<String>,
        value: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
}

fn default_parallel_pin() -> u8 {
    10
}

fn default_baud() -> u32 {
    9600
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Key {
            value: "5".to_owned(),
        }
    }
}

/// Immutable run parameters. Durations are expressed in TRs (scanner
/// repetition times) and converted to seconds with [`ExperimentConfig::tr`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Repetition time in seconds.
    pub tr: f64,
    pub trs_per_trial: u32,
    pub trs_dummy_scans: u32,
    pub trs_rest: u32,
    pub trs_instruction: u32,
    pub blocks: u32,
    pub conditions: Vec<String>,
    pub countdown_frames: usize,
    pub instruction_text: String,
    pub condition_prefix: String,
    pub log_prefix: String,
    pub trigger: TriggerConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            tr: 1.5,
            trs_per_trial: 6,
            trs_dummy_scans: 5,
            trs_rest: 6,
            trs_instruction: 2,
            blocks: 4,
            conditions: [
                "LEFT ELBOW",
                "RIGHT ELBOW",
                "LEFT HAND",
                "RIGHT HAND",
                "LEFT FOOT",
                "RIGHT FOOT",
                "TONGUE",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            countdown_frames: 12,
            instruction_text: "Please move \n\n or attempt to move \n\n the body part instructed on the screen"
                .to_owned(),
            condition_prefix: "MOVE".to_owned(),
            log_prefix: "BodyLoc".to_owned(),
            trigger: TriggerConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ParadigmError::invalid(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ParadigmError::invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn per_trial_duration(&self) -> f64 {
        self.tr * self.trs_per_trial as f64
    }

    pub fn rest_duration(&self) -> f64 {
        self.tr * self.trs_rest as f64
    }

    pub fn instruction_duration(&self) -> f64 {
        self.tr * self.trs_instruction as f64
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tr.is_finite() && self.tr > 0.0) {
            return Err(ParadigmError::invalid(format!("TR must be positive, got {}", self.tr)));
        }
        if self.trs_per_trial == 0 {
            return Err(ParadigmError::invalid("trs_per_trial must be at least 1"));
        }
        if self.trs_rest == 0 {
            return Err(ParadigmError::invalid("trs_rest must be at least 1"));
        }
        if self.blocks == 0 {
            return Err(ParadigmError::invalid("blocks must be at least 1"));
        }
        if self.countdown_frames == 0 {
            return Err(ParadigmError::invalid("countdown_frames must be at least 1"));
        }
        validate_conditions(&self.conditions)?;
        self.trigger.validate()
    }
}

pub(crate) fn validate_conditions(conditions: &[String]) -> Result<()> {
    if conditions.is_empty() {
        return Err(ParadigmError::invalid("at least one condition is required"));
    }
    let mut seen = HashSet::new();
    for name in conditions {
        if name.trim().is_empty() {
            return Err(ParadigmError::invalid("condition names must not be blank"));
        }
        if name == REST {
            return Err(ParadigmError::invalid(format!("{REST:?} is reserved for rest periods")));
        }
        if !seen.insert(name.as_str()) {
            return Err(ParadigmError::invalid(format!("duplicate condition {name:?}")));
        }
    }
    Ok(())
}

impl TriggerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            TriggerConfig::Key { value } if value.is_empty() => {
                Err(ParadigmError::invalid("trigger key value must not be empty"))
            }
            TriggerConfig::Parallel { address: None, .. } => Err(ParadigmError::invalid(
                "port address must be provided for parallel input",
            )),
            TriggerConfig::Serial { port: None, .. } => Err(ParadigmError::invalid(
                "serial port must be provided for serial input",
            )),
            TriggerConfig::Serial { value, .. } if value.is_empty() => {
                Err(ParadigmError::invalid("serial trigger value must not be empty"))
            }
            _ => Ok(()),
        }
    }
}
