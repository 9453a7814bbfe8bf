use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entities::outbox_events::{InsertOutboxEventEntity, OutboxEventEntity};
use crate::domain::value_objects::enums::outbox_statuses::OutboxStatus;

/// Duplicate idempotency keys are expected under concurrent schedulers and
/// mean "someone else already enqueued this attempt".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    AlreadyEnqueued,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(&self, insert: InsertOutboxEventEntity) -> Result<EnqueueOutcome>;

    /// Atomically claims up to `limit` PENDING rows ready to publish, oldest
    /// first by (next_attempt_at, created_at), skipping rows claimed by a
    /// concurrent publisher. The claim pushes next_attempt_at to `hold_until`
    /// so a crashed publisher's rows re-enter the ready set on their own.
    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        hold_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEventEntity>>;

    async fn mark_sent(&self, id: Uuid, publish_attempts: i32, now: DateTime<Utc>) -> Result<()>;

    async fn mark_retry(
        &self,
        id: Uuid,
        publish_attempts: i32,
        last_error: String,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn mark_dead(
        &self,
        id: Uuid,
        publish_attempts: i32,
        last_error: String,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn count_by_status(&self, status: OutboxStatus) -> Result<i64>;
}
