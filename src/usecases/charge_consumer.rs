use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::domain::entities::renewal_attempts::InsertRenewalAttemptEntity;
use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::domain::gateways::cache::SubscriptionCache;
use crate::domain::gateways::payments::{ChargeOutcome, PaymentGateway};
use crate::domain::repositories::renewal_attempts::RenewalAttemptRepository;
use crate::domain::repositories::subscriptions::{ApplyOutcome, SubscriptionRepository};
use crate::domain::time::Clock;
use crate::domain::value_objects::charge_requests::PaymentChargeRequested;
use crate::domain::value_objects::enums::renewal_attempt_results::RenewalAttemptResult;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::usecases::transitions;

/// Applies CHARGE_REQUESTED messages. Delivery is at-least-once, so every
/// path re-validates the subscription against the message and the recorded
/// attempt history before charging; stale or duplicate deliveries drop out
/// as no-ops.
pub struct ChargeResultConsumer<S, A, G, C, K>
where
    S: SubscriptionRepository + 'static,
    A: RenewalAttemptRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    subscription_repo: Arc<S>,
    attempt_repo: Arc<A>,
    gateway: Arc<G>,
    cache: Arc<C>,
    clock: Arc<K>,
}

impl<S, A, G, C, K> ChargeResultConsumer<S, A, G, C, K>
where
    S: SubscriptionRepository + 'static,
    A: RenewalAttemptRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    pub fn new(
        subscription_repo: Arc<S>,
        attempt_repo: Arc<A>,
        gateway: Arc<G>,
        cache: Arc<C>,
        clock: Arc<K>,
    ) -> Self {
        Self {
            subscription_repo,
            attempt_repo,
            gateway,
            cache,
            clock,
        }
    }

    pub async fn handle(&self, message: &PaymentChargeRequested) -> Result<()> {
        let Some(subscription) = self
            .subscription_repo
            .find_by_id(message.subscription_id)
            .await?
        else {
            warn!(
                subscription_id = %message.subscription_id,
                "charge consumer: subscription no longer exists, dropping message"
            );
            return Ok(());
        };

        if subscription.status_enum() != Some(SubscriptionStatus::Active)
            || !subscription.auto_renew
        {
            debug!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                auto_renew = subscription.auto_renew,
                "charge consumer: subscription not renewable anymore, dropping"
            );
            return self.release_lease(subscription).await;
        }

        if subscription.expiration_date != message.cycle_expiration_date {
            // The cycle already moved on; this message is from an earlier
            // cycle and must not charge again.
            debug!(
                subscription_id = %subscription.id,
                message_cycle = %message.cycle_expiration_date,
                current_cycle = %subscription.expiration_date,
                "charge consumer: stale cycle, dropping"
            );
            return self.release_lease(subscription).await;
        }

        let already_attempted = self
            .attempt_repo
            .exists(
                message.subscription_id,
                message.cycle_expiration_date,
                message.attempt_number,
            )
            .await?;
        if already_attempted {
            debug!(
                subscription_id = %subscription.id,
                attempt_number = message.attempt_number,
                "charge consumer: attempt already processed, dropping redelivery"
            );
            return self.release_lease(subscription).await;
        }

        let outcome = self
            .gateway
            .charge(message.user_id, message.amount_cents)
            .await
            .context("charge gateway call failed")?;
        let now = self.clock.now();
        let attempt = self.attempt_insert(message, now, &outcome);

        let mut updated = subscription.clone();
        match outcome {
            ChargeOutcome::Approved => {
                transitions::apply_approved_charge(&mut updated, now)?;
                info!(
                    subscription_id = %updated.id,
                    new_expiration = %updated.expiration_date,
                    "charge consumer: charge approved, renewing cycle"
                );
            }
            ChargeOutcome::Declined { ref code, .. } => {
                transitions::apply_declined_charge(&mut updated, message.attempt_number, now);
                warn!(
                    subscription_id = %updated.id,
                    attempt_number = message.attempt_number,
                    decline_code = %code,
                    status = %updated.status,
                    "charge consumer: charge declined"
                );
            }
        }

        let user_id = subscription.user_id;
        match self
            .subscription_repo
            .save_with_attempt(updated, attempt)
            .await?
        {
            ApplyOutcome::Applied => {}
            ApplyOutcome::AlreadyRecorded => {
                // Lost the insert race to a concurrent delivery; that
                // delivery owns the transition.
                debug!(
                    subscription_id = %subscription.id,
                    attempt_number = message.attempt_number,
                    "charge consumer: attempt recorded concurrently, dropping"
                );
                return self.release_lease(subscription).await;
            }
            ApplyOutcome::VersionConflict => {
                // Attempt rolled back with the conflict; the charge stays
                // replayable once the lease expires.
                warn!(
                    %user_id,
                    attempt_number = message.attempt_number,
                    "charge consumer: subscription changed concurrently, outcome not applied"
                );
            }
        }
        self.cache.evict_active(user_id);
        Ok(())
    }

    async fn release_lease(&self, mut subscription: SubscriptionEntity) -> Result<()> {
        if subscription.renewal_in_flight_until.is_none() {
            return Ok(());
        }
        subscription.renewal_in_flight_until = None;
        subscription.updated_at = self.clock.now();
        let user_id = subscription.user_id;
        if !self.subscription_repo.save(subscription).await? {
            debug!(%user_id, "charge consumer: lease release lost a version race");
        }
        self.cache.evict_active(user_id);
        Ok(())
    }

    fn attempt_insert(
        &self,
        message: &PaymentChargeRequested,
        attempted_at: chrono::DateTime<chrono::Utc>,
        outcome: &ChargeOutcome,
    ) -> InsertRenewalAttemptEntity {
        let (result, error_code, error_message) = match outcome {
            ChargeOutcome::Approved => (RenewalAttemptResult::Success, None, None),
            ChargeOutcome::Declined { code, message } => (
                RenewalAttemptResult::Failure,
                Some(code.clone()),
                Some(message.clone()),
            ),
        };

        InsertRenewalAttemptEntity {
            subscription_id: message.subscription_id,
            cycle_expiration_date: message.cycle_expiration_date,
            attempt_number: message.attempt_number,
            attempted_at,
            result: result.to_string(),
            amount_cents: message.amount_cents,
            error_code,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateways::cache::MockSubscriptionCache;
    use crate::domain::gateways::payments::MockPaymentGateway;
    use crate::domain::repositories::renewal_attempts::MockRenewalAttemptRepository;
    use crate::domain::repositories::subscriptions::MockSubscriptionRepository;
    use crate::domain::time::MockClock;
    use crate::domain::value_objects::enums::plans::Plan;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const NOW: &str = "2025-04-10T04:00:00Z";

    fn fixed_clock() -> MockClock {
        let now: DateTime<Utc> = NOW.parse().unwrap();
        let mut clock = MockClock::new();
        clock.expect_now().returning(move || now);
        clock.expect_today_utc().returning(move || now.date_naive());
        clock
    }

    fn quiet_cache() -> MockSubscriptionCache {
        let mut cache = MockSubscriptionCache::new();
        cache.expect_evict_active().returning(|_| ());
        cache
    }

    fn leased_subscription(failures: i32) -> SubscriptionEntity {
        let now: DateTime<Utc> = NOW.parse().unwrap();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan: Plan::Basic.to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            status: SubscriptionStatus::Active.to_string(),
            auto_renew: true,
            renewal_failures: failures,
            next_renewal_attempt_at: None,
            renewal_in_flight_until: Some(now + chrono::Duration::minutes(8)),
            cancel_requested_at: None,
            suspended_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn message_for(subscription: &SubscriptionEntity, attempt_number: i32) -> PaymentChargeRequested {
        PaymentChargeRequested {
            outbox_event_id: Some(Uuid::new_v4()),
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            cycle_expiration_date: subscription.expiration_date,
            attempt_number,
            amount_cents: 1990,
            requested_at: NOW.parse().unwrap(),
        }
    }

    fn consumer(
        subscription_repo: MockSubscriptionRepository,
        attempt_repo: MockRenewalAttemptRepository,
        gateway: MockPaymentGateway,
        cache: MockSubscriptionCache,
    ) -> ChargeResultConsumer<
        MockSubscriptionRepository,
        MockRenewalAttemptRepository,
        MockPaymentGateway,
        MockSubscriptionCache,
        MockClock,
    > {
        ChargeResultConsumer::new(
            Arc::new(subscription_repo),
            Arc::new(attempt_repo),
            Arc::new(gateway),
            Arc::new(cache),
            Arc::new(fixed_clock()),
        )
    }

    fn approving_gateway() -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_charge()
            .returning(|_, _| Ok(ChargeOutcome::Approved));
        gateway
    }

    #[tokio::test]
    async fn approved_charge_renews_cycle_atomically_with_its_attempt() {
        let subscription = leased_subscription(0);
        let message = message_for(&subscription, 1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_save_with_attempt()
            .times(1)
            .returning(|saved, attempt| {
                assert_eq!(
                    saved.expiration_date,
                    NaiveDate::from_ymd_opt(2025, 5, 10).unwrap()
                );
                assert_eq!(saved.renewal_failures, 0);
                assert!(saved.renewal_in_flight_until.is_none());
                assert_eq!(attempt.result, "SUCCESS");
                assert_eq!(attempt.attempt_number, 1);
                Ok(ApplyOutcome::Applied)
            });
        subscription_repo.expect_save().never();

        let mut attempt_repo = MockRenewalAttemptRepository::new();
        attempt_repo.expect_exists().returning(|_, _, _| Ok(false));

        let consumer = consumer(
            subscription_repo,
            attempt_repo,
            approving_gateway(),
            quiet_cache(),
        );
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn third_decline_suspends() {
        let subscription = leased_subscription(2);
        let message = message_for(&subscription, 3);

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_save_with_attempt()
            .returning(|saved, attempt| {
                assert_eq!(saved.status, "SUSPENDED");
                assert!(!saved.auto_renew);
                assert_eq!(attempt.result, "FAILURE");
                Ok(ApplyOutcome::Applied)
            });

        let mut attempt_repo = MockRenewalAttemptRepository::new();
        attempt_repo.expect_exists().returning(|_, _, _| Ok(false));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_charge()
            .returning(|_, _| Ok(ChargeOutcome::declined("PAYMENT_DECLINED", "no funds")));

        let consumer = consumer(subscription_repo, attempt_repo, gateway, quiet_cache());
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn redelivery_of_processed_attempt_is_a_noop() {
        let subscription = leased_subscription(0);
        let message = message_for(&subscription, 1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        // Only the lease release writes; no transition.
        subscription_repo.expect_save().times(1).returning(|saved| {
            assert!(saved.renewal_in_flight_until.is_none());
            assert_eq!(
                saved.expiration_date,
                NaiveDate::from_ymd_opt(2025, 4, 10).unwrap()
            );
            Ok(true)
        });
        subscription_repo.expect_save_with_attempt().never();

        let mut attempt_repo = MockRenewalAttemptRepository::new();
        attempt_repo.expect_exists().returning(|_, _, _| Ok(true));

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().never();

        let consumer = consumer(subscription_repo, attempt_repo, gateway, quiet_cache());
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn version_conflict_rolls_attempt_back_so_renewal_is_not_lost() {
        // A conflicting save must not strand a recorded attempt: the rolled
        // back attempt leaves the dedup check clear, so the next delivery
        // charges again and the cycle actually advances.
        let subscription = leased_subscription(0);
        let message = message_for(&subscription, 1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        let calls = AtomicUsize::new(0);
        subscription_repo
            .expect_save_with_attempt()
            .times(2)
            .returning(move |saved, _| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(ApplyOutcome::VersionConflict)
                } else {
                    assert_eq!(
                        saved.expiration_date,
                        NaiveDate::from_ymd_opt(2025, 5, 10).unwrap()
                    );
                    Ok(ApplyOutcome::Applied)
                }
            });

        let mut attempt_repo = MockRenewalAttemptRepository::new();
        attempt_repo
            .expect_exists()
            .times(2)
            .returning(|_, _, _| Ok(false));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_charge()
            .times(2)
            .returning(|_, _| Ok(ChargeOutcome::Approved));

        let consumer = consumer(subscription_repo, attempt_repo, gateway, quiet_cache());
        consumer.handle(&message).await.unwrap();
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn stale_cycle_message_does_not_charge() {
        let mut subscription = leased_subscription(0);
        let mut message = message_for(&subscription, 1);
        // Cycle already advanced past the message's cycle.
        message.cycle_expiration_date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        subscription.expiration_date = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo.expect_save().times(1).returning(|saved| {
            assert!(saved.renewal_in_flight_until.is_none());
            Ok(true)
        });

        let mut attempt_repo = MockRenewalAttemptRepository::new();
        attempt_repo.expect_exists().never();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().never();

        let consumer = consumer(subscription_repo, attempt_repo, gateway, quiet_cache());
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn lease_release_tolerates_losing_a_version_race() {
        let mut subscription = leased_subscription(0);
        let mut message = message_for(&subscription, 1);
        message.cycle_expiration_date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        subscription.expiration_date = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        // Whoever won the race owns the row; the lease expiry covers the rest.
        subscription_repo.expect_save().times(1).returning(|_| Ok(false));

        let consumer = consumer(
            subscription_repo,
            MockRenewalAttemptRepository::new(),
            MockPaymentGateway::new(),
            quiet_cache(),
        );
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn canceled_subscription_drops_message() {
        let mut subscription = leased_subscription(0);
        subscription.status = SubscriptionStatus::CancelScheduled.to_string();
        subscription.auto_renew = false;
        let message = message_for(&subscription, 1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo.expect_save().times(1).returning(|saved| {
            assert!(saved.renewal_in_flight_until.is_none());
            assert_eq!(saved.status, "CANCEL_SCHEDULED");
            Ok(true)
        });

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().never();

        let consumer = consumer(
            subscription_repo,
            MockRenewalAttemptRepository::new(),
            gateway,
            quiet_cache(),
        );
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn missing_subscription_drops_message() {
        let subscription = leased_subscription(0);
        let message = message_for(&subscription, 1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_id().returning(|_| Ok(None));
        subscription_repo.expect_save().never();

        let consumer = consumer(
            subscription_repo,
            MockRenewalAttemptRepository::new(),
            MockPaymentGateway::new(),
            quiet_cache(),
        );
        consumer.handle(&message).await.unwrap();
    }

    #[tokio::test]
    async fn lost_record_race_leaves_transition_to_winner() {
        let subscription = leased_subscription(0);
        let message = message_for(&subscription, 1);

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        subscription_repo
            .expect_save_with_attempt()
            .returning(|_, _| Ok(ApplyOutcome::AlreadyRecorded));
        subscription_repo.expect_save().times(1).returning(|saved| {
            assert!(saved.renewal_in_flight_until.is_none());
            assert_eq!(saved.renewal_failures, 0);
            Ok(true)
        });

        let mut attempt_repo = MockRenewalAttemptRepository::new();
        attempt_repo.expect_exists().returning(|_, _, _| Ok(false));

        let consumer = consumer(
            subscription_repo,
            attempt_repo,
            approving_gateway(),
            quiet_cache(),
        );
        consumer.handle(&message).await.unwrap();
    }
}
