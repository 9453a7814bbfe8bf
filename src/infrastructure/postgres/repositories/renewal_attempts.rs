use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::{RunQueryDsl, dsl::exists, prelude::*, select};
use uuid::Uuid;

use crate::domain::repositories::renewal_attempts::RenewalAttemptRepository;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad, schema::subscription_renewal_attempts,
};

pub struct RenewalAttemptPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl RenewalAttemptPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl RenewalAttemptRepository for RenewalAttemptPostgres {
    async fn exists(
        &self,
        subscription_id: Uuid,
        cycle_expiration_date: NaiveDate,
        attempt_number: i32,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let found = select(exists(
            subscription_renewal_attempts::table
                .filter(subscription_renewal_attempts::subscription_id.eq(subscription_id))
                .filter(
                    subscription_renewal_attempts::cycle_expiration_date.eq(cycle_expiration_date),
                )
                .filter(subscription_renewal_attempts::attempt_number.eq(attempt_number)),
        ))
        .get_result::<bool>(&mut conn)?;

        Ok(found)
    }
}
