use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::infrastructure::postgres::schema::subscriptions;

/// One subscription row. The billing cycle is the half-open date interval
/// `[start_date, expiration_date)`. `version` backs optimistic updates;
/// `renewal_in_flight_until` is the lease guarding an outstanding async
/// charge attempt.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable, QueryableByName)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: String,
    pub start_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub status: String,
    pub auto_renew: bool,
    pub renewal_failures: i32,
    pub next_renewal_attempt_at: Option<DateTime<Utc>>,
    pub renewal_in_flight_until: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionEntity {
    pub fn status_enum(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub user_id: Uuid,
    pub plan: String,
    pub start_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub status: String,
    pub auto_renew: bool,
    pub renewal_failures: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
