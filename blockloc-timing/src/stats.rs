/// One realized hold compared against its plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldSample {
    pub planned_duration: f64,
    pub measured_duration: f64,
    /// `onset - planned_onset`, both relative to the first timed entry.
    pub drift: f64,
}

impl HoldSample {
    pub fn error(&self) -> f64 {
        self.measured_duration - self.planned_duration
    }
}

/// Summary of hold accuracy over a session, in seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldStats {
    pub samples: usize,
    pub mean_error: f64,
    pub jitter: f64,
    pub min_error: f64,
    pub max_error: f64,
    pub max_abs_drift: f64,
}

impl HoldStats {
    pub fn from_samples(samples: &[HoldSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let errors: Vec<f64> = samples.iter().map(HoldSample::error).collect();
        let mean = errors.iter().sum::<f64>() / n;
        let var = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = errors.iter().copied().fold(f64::INFINITY, f64::min);
        let max = errors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let max_abs_drift = samples.iter().map(|s| s.drift.abs()).fold(0.0, f64::max);

        HoldStats {
            samples: samples.len(),
            mean_error: mean,
            jitter: var.sqrt(),
            min_error: min,
            max_error: max,
            max_abs_drift,
        }
    }
}
