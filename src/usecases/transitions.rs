use anyhow::{Context, Result};
use chrono::{DateTime, Months, Utc};

use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::domain::value_objects::backoff::renewal_backoff;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

/// Third consecutive decline in a cycle suspends the subscription.
pub const MAX_RENEWAL_FAILURES: i32 = 3;

/// Approved charge: the cycle window `[start, expiration)` shifts forward one
/// month, failure tracking resets, and any backoff or in-flight lease clears.
/// Status is re-asserted as ACTIVE (a no-op on the only reachable input).
pub fn apply_approved_charge(
    subscription: &mut SubscriptionEntity,
    now: DateTime<Utc>,
) -> Result<()> {
    let cycle_expiration = subscription.expiration_date;
    subscription.start_date = cycle_expiration;
    subscription.expiration_date = cycle_expiration
        .checked_add_months(Months::new(1))
        .context("expiration date out of range")?;
    subscription.status = SubscriptionStatus::Active.to_string();
    subscription.renewal_failures = 0;
    subscription.next_renewal_attempt_at = None;
    subscription.renewal_in_flight_until = None;
    subscription.updated_at = now;
    Ok(())
}

/// Declined charge: attempts 1 and 2 schedule a retry after a fixed backoff;
/// the third strike suspends and turns auto-renew off. SUSPENDED is terminal
/// here, there is no reactivation path.
pub fn apply_declined_charge(
    subscription: &mut SubscriptionEntity,
    attempt_number: i32,
    now: DateTime<Utc>,
) {
    subscription.renewal_failures = attempt_number;
    subscription.renewal_in_flight_until = None;

    if attempt_number >= MAX_RENEWAL_FAILURES {
        subscription.status = SubscriptionStatus::Suspended.to_string();
        subscription.auto_renew = false;
        subscription.next_renewal_attempt_at = None;
        subscription.suspended_at = Some(now);
    } else {
        subscription.next_renewal_attempt_at = Some(now + renewal_backoff(attempt_number));
    }

    subscription.updated_at = now;
}

/// User-requested cancellation: access stays until the current expiration
/// date, only auto-renew stops. Callers are responsible for treating a repeat
/// cancel as a no-op.
pub fn apply_cancel_requested(subscription: &mut SubscriptionEntity, now: DateTime<Utc>) {
    subscription.status = SubscriptionStatus::CancelScheduled.to_string();
    subscription.auto_renew = false;
    subscription.cancel_requested_at = Some(now);
    subscription.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn subscription(start: &str, expiration: &str) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan: "BASIC".to_string(),
            start_date: start.parse::<NaiveDate>().unwrap(),
            expiration_date: expiration.parse::<NaiveDate>().unwrap(),
            status: SubscriptionStatus::Active.to_string(),
            auto_renew: true,
            renewal_failures: 0,
            next_renewal_attempt_at: None,
            renewal_in_flight_until: Some(now),
            cancel_requested_at: None,
            suspended_at: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn approved_charge_shifts_cycle_one_month() {
        let mut s = subscription("2025-03-10", "2025-04-10");
        s.renewal_failures = 2;
        let now = Utc::now();

        apply_approved_charge(&mut s, now).unwrap();

        assert_eq!(s.start_date, "2025-04-10".parse::<NaiveDate>().unwrap());
        assert_eq!(s.expiration_date, "2025-05-10".parse::<NaiveDate>().unwrap());
        assert_eq!(s.status, SubscriptionStatus::Active.to_string());
        assert_eq!(s.renewal_failures, 0);
        assert!(s.next_renewal_attempt_at.is_none());
        assert!(s.renewal_in_flight_until.is_none());
    }

    #[test]
    fn approved_charge_handles_month_end_clamping() {
        let mut s = subscription("2024-12-31", "2025-01-31");

        apply_approved_charge(&mut s, Utc::now()).unwrap();

        // January 31 + 1 month clamps to the last day of February.
        assert_eq!(s.expiration_date, "2025-02-28".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn first_decline_schedules_retry_in_15_minutes() {
        let mut s = subscription("2025-03-10", "2025-04-10");
        let now = "2025-04-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        apply_declined_charge(&mut s, 1, now);

        assert_eq!(s.status, SubscriptionStatus::Active.to_string());
        assert_eq!(s.renewal_failures, 1);
        assert_eq!(
            s.next_renewal_attempt_at,
            Some(now + chrono::Duration::minutes(15))
        );
        assert!(s.renewal_in_flight_until.is_none());
    }

    #[test]
    fn second_decline_schedules_retry_in_60_minutes() {
        let mut s = subscription("2025-03-10", "2025-04-10");
        let now = "2025-04-10T00:15:00Z".parse::<DateTime<Utc>>().unwrap();

        apply_declined_charge(&mut s, 2, now);

        assert_eq!(s.renewal_failures, 2);
        assert_eq!(
            s.next_renewal_attempt_at,
            Some(now + chrono::Duration::minutes(60))
        );
    }

    #[test]
    fn third_decline_suspends_and_stops_auto_renew() {
        let mut s = subscription("2025-03-10", "2025-04-10");
        let now = Utc::now();

        apply_declined_charge(&mut s, 3, now);

        assert_eq!(s.status, SubscriptionStatus::Suspended.to_string());
        assert!(!s.auto_renew);
        assert_eq!(s.renewal_failures, 3);
        assert!(s.next_renewal_attempt_at.is_none());
        assert_eq!(s.suspended_at, Some(now));
        assert!(s.renewal_in_flight_until.is_none());
    }

    #[test]
    fn cancel_keeps_access_until_expiration() {
        let mut s = subscription("2025-03-10", "2025-04-10");
        let now = Utc::now();

        apply_cancel_requested(&mut s, now);

        assert_eq!(s.status, SubscriptionStatus::CancelScheduled.to_string());
        assert!(!s.auto_renew);
        assert_eq!(s.cancel_requested_at, Some(now));
        assert_eq!(s.expiration_date, "2025-04-10".parse::<NaiveDate>().unwrap());
    }
}
