use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Timestamptz};
use diesel::{RunQueryDsl, insert_into, prelude::*, sql_query, update};
use uuid::Uuid;

use crate::domain::entities::outbox_events::{InsertOutboxEventEntity, OutboxEventEntity};
use crate::domain::repositories::outbox::{EnqueueOutcome, OutboxRepository};
use crate::domain::value_objects::enums::outbox_statuses::OutboxStatus;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::outbox_events};

/// The claim pushes next_attempt_at forward so a publisher that dies between
/// claiming and marking the outcome releases its rows by timeout instead of
/// wedging them. The pre-update ready time rides along as `ready_at` because
/// RETURNING only sees the post-update rows.
const CLAIM_READY: &str = r#"
    WITH ready AS (
        SELECT id, next_attempt_at AS ready_at, created_at
        FROM outbox_events
        WHERE status = 'PENDING'
          AND next_attempt_at <= $2
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $3
        FOR UPDATE SKIP LOCKED
    )
    UPDATE outbox_events
    SET next_attempt_at = $1
    FROM ready
    WHERE outbox_events.id = ready.id
    RETURNING outbox_events.*, ready.ready_at
"#;

#[derive(QueryableByName)]
struct ClaimedEventRow {
    #[diesel(embed)]
    event: OutboxEventEntity,
    #[diesel(sql_type = Timestamptz)]
    ready_at: DateTime<Utc>,
}

/// Restores oldest-ready-first order on the claimed batch; RETURNING does not
/// honor the subquery ordering and the claim just rewrote next_attempt_at.
fn order_claimed(mut rows: Vec<ClaimedEventRow>) -> Vec<OutboxEventEntity> {
    rows.sort_by(|a, b| {
        a.ready_at
            .cmp(&b.ready_at)
            .then(a.event.created_at.cmp(&b.event.created_at))
    });
    rows.into_iter().map(|row| row.event).collect()
}

pub struct OutboxPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl OutboxPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl OutboxRepository for OutboxPostgres {
    async fn enqueue(&self, insert: InsertOutboxEventEntity) -> Result<EnqueueOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(outbox_events::table)
            .values(&insert)
            .execute(&mut conn);

        match result {
            Ok(_) => Ok(EnqueueOutcome::Enqueued),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(EnqueueOutcome::AlreadyEnqueued)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        hold_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEventEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let claimed = sql_query(CLAIM_READY)
            .bind::<Timestamptz, _>(hold_until)
            .bind::<Timestamptz, _>(now)
            .bind::<BigInt, _>(limit)
            .load::<ClaimedEventRow>(&mut conn)?;

        Ok(order_claimed(claimed))
    }

    async fn mark_sent(&self, id: Uuid, publish_attempts: i32, now: DateTime<Utc>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(outbox_events::table)
            .filter(outbox_events::id.eq(id))
            .set((
                outbox_events::status.eq(OutboxStatus::Sent.to_string()),
                outbox_events::sent_at.eq(Some(now)),
                outbox_events::publish_attempts.eq(publish_attempts),
                outbox_events::last_error.eq(None::<String>),
                outbox_events::next_attempt_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        publish_attempts: i32,
        last_error: String,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(outbox_events::table)
            .filter(outbox_events::id.eq(id))
            .set((
                outbox_events::publish_attempts.eq(publish_attempts),
                outbox_events::last_error.eq(Some(last_error)),
                outbox_events::next_attempt_at.eq(next_attempt_at),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_dead(
        &self,
        id: Uuid,
        publish_attempts: i32,
        last_error: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(outbox_events::table)
            .filter(outbox_events::id.eq(id))
            .set((
                outbox_events::status.eq(OutboxStatus::Dead.to_string()),
                outbox_events::dead_at.eq(Some(now)),
                outbox_events::publish_attempts.eq(publish_attempts),
                outbox_events::last_error.eq(Some(last_error)),
                outbox_events::next_attempt_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let count = outbox_events::table
            .filter(outbox_events::status.eq(status.to_string()))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(count)
    }
}
