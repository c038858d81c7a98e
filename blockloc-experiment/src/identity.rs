use blockloc_core::{ParadigmError, Result};
use serde::{Deserialize, Serialize};

use crate::schedule::session_seed;

/// Who is being scanned, and which run this is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub initials: String,
    pub subject: u32,
    pub run: u32,
}

impl SessionIdentity {
    pub fn new(initials: &str, subject: u32, run: u32) -> Result<Self> {
        let initials = initials.trim();
        if initials.is_empty() {
            return Err(ParadigmError::invalid("participant initials cannot be empty"));
        }
        if initials.contains(['/', '\\']) || initials.chars().any(char::is_control) {
            return Err(ParadigmError::invalid(format!(
                "participant initials {initials:?} contain path characters"
            )));
        }
        Ok(Self {
            initials: initials.to_owned(),
            subject,
            run,
        })
    }

    pub fn seed(&self) -> u64 {
        session_seed(self.subject, self.run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_initials() {
        let id = SessionIdentity::new(" TBS ", 1, 2).unwrap();
        assert_eq!(
            id,
            SessionIdentity {
                initials: "TBS".into(),
                subject: 1,
                run: 2,
            }
        );
        assert_eq!(id.seed(), 3);
    }

    #[test]
    fn rejects_blank_or_path_like_initials() {
        assert!(SessionIdentity::new("", 1, 1).is_err());
        assert!(SessionIdentity::new("   ", 1, 1).is_err());
        assert!(SessionIdentity::new("../x", 1, 1).is_err());
        assert!(SessionIdentity::new("a\\b", 1, 1).is_err());
    }
}
