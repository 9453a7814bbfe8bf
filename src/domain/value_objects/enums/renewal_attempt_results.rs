use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RenewalAttemptResult {
    Success,
    Failure,
}

impl RenewalAttemptResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalAttemptResult::Success => "SUCCESS",
            RenewalAttemptResult::Failure => "FAILURE",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(RenewalAttemptResult::Success),
            "FAILURE" => Some(RenewalAttemptResult::Failure),
            _ => None,
        }
    }
}

impl Display for RenewalAttemptResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
