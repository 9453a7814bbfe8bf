use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Fixed-price plans. Prices are in cents; there is no multi-currency support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Plan {
    Basic,
    Premium,
    Family,
}

impl Plan {
    pub fn price_cents(&self) -> i32 {
        match self {
            Plan::Basic => 1990,
            Plan::Premium => 3990,
            Plan::Family => 5990,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "BASIC",
            Plan::Premium => "PREMIUM",
            Plan::Family => "FAMILY",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "BASIC" => Some(Plan::Basic),
            "PREMIUM" => Some(Plan::Premium),
            "FAMILY" => Some(Plan::Family),
            _ => None,
        }
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
