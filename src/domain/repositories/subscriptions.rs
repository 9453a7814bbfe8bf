use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::entities::renewal_attempts::InsertRenewalAttemptEntity;
use crate::domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};

/// Result of inserting a new subscription. The database enforces at most one
/// ACTIVE or CANCEL_SCHEDULED row per user; a unique violation surfaces as
/// `Conflict` instead of an error.
#[derive(Debug, Clone)]
pub enum InsertSubscriptionOutcome {
    Created(SubscriptionEntity),
    Conflict,
}

/// Result of atomically recording a charge attempt and applying its outcome
/// to the subscription. The two writes commit together or not at all: either
/// the attempt row is a duplicate (nothing written), the version check lost
/// (attempt rolled back), or both landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    AlreadyRecorded,
    VersionConflict,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, insert: InsertSubscriptionEntity) -> Result<InsertSubscriptionOutcome>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// The user's ACTIVE or CANCEL_SCHEDULED subscription, if any.
    async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn history_for_user(&self, user_id: Uuid) -> Result<Vec<SubscriptionEntity>>;

    /// Optimistic full-row update guarded by the version counter. Returns
    /// false when another writer got there first.
    async fn save(&self, entity: SubscriptionEntity) -> Result<bool>;

    /// Inserts the attempt record and performs the versioned subscription
    /// update in one transaction, so an attempt row can never persist without
    /// its outcome applied.
    async fn save_with_attempt(
        &self,
        entity: SubscriptionEntity,
        attempt: InsertRenewalAttemptEntity,
    ) -> Result<ApplyOutcome>;

    /// Atomically claims one subscription due for renewal today, skipping rows
    /// claimed by concurrent schedulers, and stamps the in-flight lease so the
    /// claim expires into retriability if the claimant dies.
    async fn claim_one_due_for_renewal(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Atomically claims one expired CANCEL_SCHEDULED subscription and
    /// transitions it to CANCELED in the same statement.
    async fn claim_one_due_for_finalization(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>>;
}
