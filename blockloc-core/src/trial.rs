use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParadigmError;

/// Sentinel condition name for rest periods.
pub const REST: &str = "REST";

/// Trial column of the schedule and event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TrialLabel {
    /// 1-based position within a block
    Index(u32),
    Rest,
    FinalRest,
    InitialRest,
}

impl TrialLabel {
    pub fn is_rest(&self) -> bool {
        !matches!(self, TrialLabel::Index(_))
    }
}

impl fmt::Display for TrialLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialLabel::Index(n) => write!(f, "{n}"),
            TrialLabel::Rest => f.write_str("rest"),
            TrialLabel::FinalRest => f.write_str("final_rest"),
            TrialLabel::InitialRest => f.write_str("initial_rest"),
        }
    }
}

impl FromStr for TrialLabel {
    type Err = ParadigmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rest" => Ok(TrialLabel::Rest),
            "final_rest" => Ok(TrialLabel::FinalRest),
            "initial_rest" => Ok(TrialLabel::InitialRest),
            other => match other.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(TrialLabel::Index(n)),
                _ => Err(ParadigmError::invalid(format!("unknown trial label {other:?}"))),
            },
        }
    }
}

impl From<TrialLabel> for String {
    fn from(label: TrialLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for TrialLabel {
    type Error = ParadigmError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A configured condition or the rest sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    Named(String),
    Rest,
}

impl Condition {
    pub fn named(name: impl Into<String>) -> Self {
        Condition::Named(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Condition::Named(name) => name,
            Condition::Rest => REST,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Condition::Rest)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Condition {
    fn from(s: &str) -> Self {
        if s == REST {
            Condition::Rest
        } else {
            Condition::Named(s.to_owned())
        }
    }
}

impl From<String> for Condition {
    fn from(s: String) -> Self {
        if s == REST {
            Condition::Rest
        } else {
            Condition::Named(s)
        }
    }
}

impl From<Condition> for String {
    fn from(c: Condition) -> Self {
        match c {
            Condition::Named(name) => name,
            Condition::Rest => REST.to_owned(),
        }
    }
}

/// One planned unit of presentation.
///
/// `planned_onset` assumes zero scheduling jitter and is kept for the audit
/// trail only. Presentation timing never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub block: u32,
    pub trial: TrialLabel,
    pub condition: Condition,
    pub planned_onset: f64,
    pub planned_duration: f64,
}

/// One realized presentation, measured against the zeroed session clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeLogRecord {
    pub block: u32,
    pub trial: TrialLabel,
    pub condition: Condition,
    pub onset: f64,
    pub duration: f64,
}

impl RuntimeLogRecord {
    pub fn for_entry(entry: &ScheduleEntry, onset: f64, duration: f64) -> Self {
        Self {
            block: entry.block,
            trial: entry.trial,
            condition: entry.condition.clone(),
            onset,
            duration,
        }
    }

    /// End time of the presentation.
    pub fn cumulative_onset(&self) -> f64 {
        self.onset + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_labels_use_sentinel_spellings() {
        for (label, text) in [
            (TrialLabel::Index(3), "3"),
            (TrialLabel::Rest, "rest"),
            (TrialLabel::FinalRest, "final_rest"),
            (TrialLabel::InitialRest, "initial_rest"),
        ] {
            assert_eq!(label.to_string(), text);
            assert_eq!(text.parse::<TrialLabel>().unwrap(), label);
        }
        assert!("0".parse::<TrialLabel>().is_err());
        assert!("pause".parse::<TrialLabel>().is_err());
    }

    #[test]
    fn rest_name_maps_to_sentinel() {
        assert_eq!(Condition::from("REST"), Condition::Rest);
        assert_eq!(Condition::from("LEFT HAND"), Condition::named("LEFT HAND"));
        assert_eq!(Condition::Rest.to_string(), "REST");
    }

    #[test]
    fn cumulative_onset_is_end_time() {
        let record = RuntimeLogRecord {
            block: 1,
            trial: TrialLabel::Index(1),
            condition: Condition::named("A"),
            onset: 9.25,
            duration: 9.0,
        };
        assert_eq!(record.cumulative_onset(), 18.25);
    }
}
