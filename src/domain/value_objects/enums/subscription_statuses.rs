use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    CancelScheduled,
    Canceled,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::CancelScheduled => "CANCEL_SCHEDULED",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(SubscriptionStatus::Active),
            "CANCEL_SCHEDULED" => Some(SubscriptionStatus::CancelScheduled),
            "CANCELED" => Some(SubscriptionStatus::Canceled),
            "SUSPENDED" => Some(SubscriptionStatus::Suspended),
            _ => None,
        }
    }
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
