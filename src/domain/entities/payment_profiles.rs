use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::payment_profiles;

/// Stored decision policy for the simulated gateway. Absence of a row means
/// always-approve.
#[derive(Debug, Clone, Selectable, Queryable)]
#[diesel(table_name = payment_profiles)]
pub struct PaymentProfileEntity {
    pub user_id: Uuid,
    pub behavior: String,
    pub fail_next_n: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
