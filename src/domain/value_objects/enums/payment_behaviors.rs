use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Per-payer decision policy for the simulated gateway.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentBehavior {
    #[default]
    AlwaysApprove,
    AlwaysDecline,
    FailNextN,
}

impl PaymentBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentBehavior::AlwaysApprove => "ALWAYS_APPROVE",
            PaymentBehavior::AlwaysDecline => "ALWAYS_DECLINE",
            PaymentBehavior::FailNextN => "FAIL_NEXT_N",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "ALWAYS_APPROVE" => Some(PaymentBehavior::AlwaysApprove),
            "ALWAYS_DECLINE" => Some(PaymentBehavior::AlwaysDecline),
            "FAIL_NEXT_N" => Some(PaymentBehavior::FailNextN),
            _ => None,
        }
    }
}

impl Display for PaymentBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
