use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{Connection, RunQueryDsl, prelude::*, update};
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::payment_profiles::PaymentProfileEntity;
use crate::domain::gateways::payments::{ChargeOutcome, PaymentGateway};
use crate::domain::value_objects::enums::payment_behaviors::PaymentBehavior;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::payment_profiles};

const DECLINE_CODE: &str = "PAYMENT_DECLINED";

/// Deterministic charge decisions driven by the payer's stored profile.
/// The profile row is locked for update so a FAIL_NEXT_N counter decrements
/// exactly once per charge even under concurrent consumers.
pub struct SimulatedPaymentGateway {
    db_pool: Arc<PgPoolSquad>,
}

impl SimulatedPaymentGateway {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, payer_id: Uuid, amount_cents: i32) -> Result<ChargeOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let outcome = conn.transaction::<ChargeOutcome, diesel::result::Error, _>(|conn| {
            let profile = payment_profiles::table
                .find(payer_id)
                .for_update()
                .select(PaymentProfileEntity::as_select())
                .first::<PaymentProfileEntity>(conn)
                .optional()?;

            // No profile configured: approve.
            let Some(profile) = profile else {
                return Ok(ChargeOutcome::Approved);
            };

            let behavior = PaymentBehavior::from_str(&profile.behavior).unwrap_or_default();

            let outcome = match behavior {
                PaymentBehavior::AlwaysApprove => ChargeOutcome::Approved,
                PaymentBehavior::AlwaysDecline => {
                    ChargeOutcome::declined(DECLINE_CODE, "payment declined (simulated)")
                }
                PaymentBehavior::FailNextN => {
                    let remaining = profile.fail_next_n;
                    if remaining > 0 {
                        update(payment_profiles::table.find(payer_id))
                            .set((
                                payment_profiles::fail_next_n.eq(remaining - 1),
                                payment_profiles::updated_at.eq(Utc::now()),
                            ))
                            .execute(conn)?;
                        ChargeOutcome::declined(
                            DECLINE_CODE,
                            &format!("payment declined (simulated), remaining={}", remaining - 1),
                        )
                    } else {
                        ChargeOutcome::Approved
                    }
                }
            };

            Ok(outcome)
        })?;

        debug!(
            %payer_id,
            amount_cents,
            approved = outcome.approved(),
            "payments: simulated charge decided"
        );

        Ok(outcome)
    }
}
