use anyhow::Result;
use async_trait::async_trait;

use crate::domain::value_objects::charge_requests::PaymentChargeRequested;

/// Hands a charge request to the message broker. Delivery is at-least-once;
/// deduplication is the consumer's job, not the publisher's.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChargeRequestPublisher: Send + Sync {
    async fn publish(&self, message: PaymentChargeRequested) -> Result<()>;
}
