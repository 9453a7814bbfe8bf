use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Decision returned by the payment gateway for a single charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved,
    Declined { code: String, message: String },
}

impl ChargeOutcome {
    pub fn approved(&self) -> bool {
        matches!(self, ChargeOutcome::Approved)
    }

    pub fn declined(code: &str, message: &str) -> Self {
        ChargeOutcome::Declined {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Charge a payer. Implementations must be safe to call from within the
/// billing flow that records the attempt; in this system the gateway is a
/// deterministic simulation backed by stored payer profiles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, payer_id: Uuid, amount_cents: i32) -> Result<ChargeOutcome>;
}
