use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::outbox_events;

/// Durable integration event written in the same transaction flow as the
/// domain change it announces. `idempotency_key` is unique so two schedulers
/// cannot enqueue the same charge attempt twice.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable, QueryableByName)]
#[diesel(table_name = outbox_events)]
pub struct OutboxEventEntity {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub idempotency_key: String,
    pub payload: String,
    pub status: String,
    pub publish_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub dead_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = outbox_events)]
pub struct InsertOutboxEventEntity {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub idempotency_key: String,
    pub payload: String,
    pub status: String,
    pub publish_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}
