use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Date, Timestamptz};
use diesel::{Connection, PgConnection, QueryResult, RunQueryDsl, insert_into, prelude::*, sql_query, update};
use uuid::Uuid;

use crate::domain::entities::renewal_attempts::InsertRenewalAttemptEntity;
use crate::domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};
use crate::domain::repositories::subscriptions::{
    ApplyOutcome, InsertSubscriptionOutcome, SubscriptionRepository,
};
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    schema::{subscription_renewal_attempts, subscriptions},
};

/// Claims one due subscription and stamps the in-flight lease in a single
/// statement. SKIP LOCKED keeps concurrent schedulers from blocking on each
/// other; the lease keeps the row out of the ready set until the claimant
/// finishes or the lease expires.
const CLAIM_DUE_FOR_RENEWAL: &str = r#"
    UPDATE subscriptions
    SET renewal_in_flight_until = $1,
        updated_at = $2,
        version = version + 1
    WHERE id IN (
        SELECT id
        FROM subscriptions
        WHERE status = 'ACTIVE'
          AND auto_renew = true
          AND renewal_failures < 3
          AND expiration_date = $3
          AND (next_renewal_attempt_at IS NULL OR next_renewal_attempt_at <= $2)
          AND (renewal_in_flight_until IS NULL OR renewal_in_flight_until <= $2)
        ORDER BY expiration_date ASC, updated_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING *
"#;

/// Finalization is a pure status flip, so the claim and the transition are the
/// same statement.
const CLAIM_DUE_FOR_FINALIZATION: &str = r#"
    UPDATE subscriptions
    SET status = 'CANCELED',
        auto_renew = false,
        updated_at = $1,
        version = version + 1
    WHERE id IN (
        SELECT id
        FROM subscriptions
        WHERE status = 'CANCEL_SCHEDULED'
          AND expiration_date <= $2
        ORDER BY expiration_date ASC, updated_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING *
"#;

/// Compare-and-set update keyed on the version column. Matches 0 rows when
/// another writer bumped the version first.
fn versioned_update(conn: &mut PgConnection, entity: &SubscriptionEntity) -> QueryResult<usize> {
    update(subscriptions::table)
        .filter(subscriptions::id.eq(entity.id))
        .filter(subscriptions::version.eq(entity.version))
        .set((
            subscriptions::plan.eq(&entity.plan),
            subscriptions::start_date.eq(entity.start_date),
            subscriptions::expiration_date.eq(entity.expiration_date),
            subscriptions::status.eq(&entity.status),
            subscriptions::auto_renew.eq(entity.auto_renew),
            subscriptions::renewal_failures.eq(entity.renewal_failures),
            subscriptions::next_renewal_attempt_at.eq(entity.next_renewal_attempt_at),
            subscriptions::renewal_in_flight_until.eq(entity.renewal_in_flight_until),
            subscriptions::cancel_requested_at.eq(entity.cancel_requested_at),
            subscriptions::suspended_at.eq(entity.suspended_at),
            subscriptions::version.eq(entity.version + 1),
            subscriptions::updated_at.eq(entity.updated_at),
        ))
        .execute(conn)
}

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn create(&self, insert: InsertSubscriptionEntity) -> Result<InsertSubscriptionOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(subscriptions::table)
            .values(&insert)
            .get_result::<SubscriptionEntity>(&mut conn);

        match result {
            Ok(entity) => Ok(InsertSubscriptionOutcome::Created(entity)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(InsertSubscriptionOutcome::Conflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .find(id)
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq_any(vec![
                SubscriptionStatus::Active.to_string(),
                SubscriptionStatus::CancelScheduled.to_string(),
            ]))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn history_for_user(&self, user_id: Uuid) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .order(subscriptions::created_at.desc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn save(&self, entity: SubscriptionEntity) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = versioned_update(&mut conn, &entity)?;

        Ok(updated == 1)
    }

    async fn save_with_attempt(
        &self,
        entity: SubscriptionEntity,
        attempt: InsertRenewalAttemptEntity,
    ) -> Result<ApplyOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = conn.transaction::<_, DieselError, _>(|conn| {
            insert_into(subscription_renewal_attempts::table)
                .values(&attempt)
                .execute(conn)?;

            let updated = versioned_update(conn, &entity)?;
            if updated != 1 {
                // Version lost: roll the attempt back so the charge stays
                // replayable instead of leaving a recorded attempt with no
                // applied outcome.
                return Err(DieselError::RollbackTransaction);
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(ApplyOutcome::Applied),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(ApplyOutcome::AlreadyRecorded)
            }
            Err(DieselError::RollbackTransaction) => Ok(ApplyOutcome::VersionConflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn claim_one_due_for_renewal(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let claimed = sql_query(CLAIM_DUE_FOR_RENEWAL)
            .bind::<Timestamptz, _>(lease_until)
            .bind::<Timestamptz, _>(now)
            .bind::<Date, _>(today)
            .get_result::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(claimed)
    }

    async fn claim_one_due_for_finalization(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let claimed = sql_query(CLAIM_DUE_FOR_FINALIZATION)
            .bind::<Timestamptz, _>(now)
            .bind::<Date, _>(today)
            .get_result::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(claimed)
    }
}
