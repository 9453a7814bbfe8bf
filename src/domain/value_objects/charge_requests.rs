use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire body of a CHARGE_REQUESTED message. Written into the outbox payload
/// at enqueue time; `outbox_event_id` is stamped by the publisher just before
/// the message leaves for the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChargeRequested {
    pub outbox_event_id: Option<Uuid>,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub cycle_expiration_date: NaiveDate,
    pub attempt_number: i32,
    pub amount_cents: i32,
    pub requested_at: DateTime<Utc>,
}

impl PaymentChargeRequested {
    /// `subscriptionId|cycleExpirationDate|attemptNumber`; unique per logical
    /// charge attempt, so a second scheduler enqueueing the same attempt hits
    /// the outbox unique constraint instead of producing a duplicate.
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.subscription_id, self.cycle_expiration_date, self.attempt_number
        )
    }
}
