use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Attempt rows are written through `SubscriptionRepository::save_with_attempt`
/// so insert and subscription update share a transaction; this port only
/// covers the consumer's dedup lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenewalAttemptRepository: Send + Sync {
    async fn exists(
        &self,
        subscription_id: Uuid,
        cycle_expiration_date: NaiveDate,
        attempt_number: i32,
    ) -> Result<bool>;
}
