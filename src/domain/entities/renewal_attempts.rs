use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::subscription_renewal_attempts;

/// Write-once audit record of a single charge attempt. Unique per
/// (subscription_id, cycle_expiration_date, attempt_number); consumer-side
/// deduplication hangs off that constraint.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscription_renewal_attempts)]
pub struct InsertRenewalAttemptEntity {
    pub subscription_id: Uuid,
    pub cycle_expiration_date: NaiveDate,
    pub attempt_number: i32,
    pub attempted_at: DateTime<Utc>,
    pub result: String,
    pub amount_cents: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}
