use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::entities::outbox_events::OutboxEventEntity;
use crate::domain::gateways::broker::ChargeRequestPublisher;
use crate::domain::repositories::outbox::OutboxRepository;
use crate::domain::time::Clock;
use crate::domain::value_objects::backoff::publish_backoff;
use crate::domain::value_objects::charge_requests::PaymentChargeRequested;
use crate::domain::value_objects::enums::outbox_statuses::OutboxStatus;

const MAX_STORED_ERROR_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OutboxHealth {
    pub pending: i64,
    pub dead: i64,
}

/// Drains PENDING outbox rows to the broker. Claims hold each batch for a
/// short window so a crashed publisher's rows come back by themselves; every
/// outcome is an explicit status write, so no row is ever lost in limbo.
pub struct OutboxPublisher<O, P, K>
where
    O: OutboxRepository + 'static,
    P: ChargeRequestPublisher + 'static,
    K: Clock + 'static,
{
    outbox_repo: Arc<O>,
    publisher: Arc<P>,
    clock: Arc<K>,
    max_publish_attempts: i32,
    claim_hold: chrono::Duration,
    dead_lettered: AtomicU64,
}

impl<O, P, K> OutboxPublisher<O, P, K>
where
    O: OutboxRepository + 'static,
    P: ChargeRequestPublisher + 'static,
    K: Clock + 'static,
{
    pub fn new(
        outbox_repo: Arc<O>,
        publisher: Arc<P>,
        clock: Arc<K>,
        max_publish_attempts: i32,
        claim_hold: chrono::Duration,
    ) -> Self {
        Self {
            outbox_repo,
            publisher,
            clock,
            max_publish_attempts,
            claim_hold,
            dead_lettered: AtomicU64::new(0),
        }
    }

    /// Publishes up to `max` ready events. Returns how many were claimed.
    pub async fn publish_pending(&self, max: i64) -> Result<usize> {
        let now = self.clock.now();
        let hold_until = now + self.claim_hold;

        let claimed = self.outbox_repo.claim_ready(now, hold_until, max).await?;
        let count = claimed.len();

        for event in claimed {
            self.publish_one(event).await;
        }
        Ok(count)
    }

    async fn publish_one(&self, event: OutboxEventEntity) {
        let attempts = event.publish_attempts + 1;
        let event_id = event.id;

        let result = self.try_publish(&event).await;
        let now = self.clock.now();

        match result {
            Ok(()) => {
                if let Err(err) = self.outbox_repo.mark_sent(event_id, attempts, now).await {
                    error!(%event_id, db_error = ?err, "outbox: failed to mark event SENT");
                }
            }
            Err(err) => {
                let last_error = truncate_error(&err);
                if attempts >= self.max_publish_attempts {
                    self.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    error!(
                        %event_id,
                        attempts,
                        error = %last_error,
                        "outbox: event exhausted publish attempts, dead-lettered"
                    );
                    if let Err(err) = self
                        .outbox_repo
                        .mark_dead(event_id, attempts, last_error, now)
                        .await
                    {
                        error!(%event_id, db_error = ?err, "outbox: failed to mark event DEAD");
                    }
                } else {
                    let next_attempt_at = now + publish_backoff(attempts);
                    warn!(
                        %event_id,
                        attempts,
                        retry_at = %next_attempt_at,
                        error = %last_error,
                        "outbox: publish failed, scheduling retry"
                    );
                    if let Err(err) = self
                        .outbox_repo
                        .mark_retry(event_id, attempts, last_error, next_attempt_at)
                        .await
                    {
                        error!(%event_id, db_error = ?err, "outbox: failed to schedule retry");
                    }
                }
            }
        }
    }

    async fn try_publish(&self, event: &OutboxEventEntity) -> Result<()> {
        let mut message: PaymentChargeRequested = serde_json::from_str(&event.payload)
            .with_context(|| format!("undeliverable payload on outbox event {}", event.id))?;
        message.outbox_event_id = Some(event.id);
        self.publisher.publish(message).await
    }

    pub async fn health(&self) -> Result<OutboxHealth> {
        let pending = self.outbox_repo.count_by_status(OutboxStatus::Pending).await?;
        let dead = self.outbox_repo.count_by_status(OutboxStatus::Dead).await?;
        if dead > 0 {
            info!(pending, dead, "outbox: dead-lettered events awaiting operator review");
        }
        Ok(OutboxHealth { pending, dead })
    }

    /// Events dead-lettered by this process since startup.
    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }
}

fn truncate_error(err: &anyhow::Error) -> String {
    let full = format!("{err:#}");
    if full.chars().count() <= MAX_STORED_ERROR_CHARS {
        return full;
    }
    full.chars().take(MAX_STORED_ERROR_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateways::broker::MockChargeRequestPublisher;
    use crate::domain::repositories::outbox::MockOutboxRepository;
    use crate::domain::time::MockClock;
    use chrono::{DateTime, NaiveDate, Utc};
    use uuid::Uuid;

    const NOW: &str = "2025-04-10T05:00:00Z";

    fn fixed_clock() -> MockClock {
        let now: DateTime<Utc> = NOW.parse().unwrap();
        let mut clock = MockClock::new();
        clock.expect_now().returning(move || now);
        clock.expect_today_utc().returning(move || now.date_naive());
        clock
    }

    fn pending_event(publish_attempts: i32) -> OutboxEventEntity {
        let now: DateTime<Utc> = NOW.parse().unwrap();
        let subscription_id = Uuid::new_v4();
        let message = PaymentChargeRequested {
            outbox_event_id: None,
            subscription_id,
            user_id: Uuid::new_v4(),
            cycle_expiration_date: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            attempt_number: 1,
            amount_cents: 1990,
            requested_at: now,
        };

        OutboxEventEntity {
            id: Uuid::new_v4(),
            aggregate_type: "SUBSCRIPTION".to_string(),
            aggregate_id: subscription_id,
            event_type: "CHARGE_REQUESTED".to_string(),
            idempotency_key: message.idempotency_key(),
            payload: serde_json::to_string(&message).unwrap(),
            status: OutboxStatus::Pending.to_string(),
            publish_attempts,
            created_at: now,
            next_attempt_at: now,
            sent_at: None,
            dead_at: None,
            last_error: None,
        }
    }

    fn publisher_with(
        outbox_repo: MockOutboxRepository,
        broker: MockChargeRequestPublisher,
        max_publish_attempts: i32,
    ) -> OutboxPublisher<MockOutboxRepository, MockChargeRequestPublisher, MockClock> {
        OutboxPublisher::new(
            Arc::new(outbox_repo),
            Arc::new(broker),
            Arc::new(fixed_clock()),
            max_publish_attempts,
            chrono::Duration::seconds(60),
        )
    }

    #[tokio::test]
    async fn successful_publish_marks_sent_with_stamped_event_id() {
        let event = pending_event(0);
        let event_id = event.id;

        let mut outbox_repo = MockOutboxRepository::new();
        let batch = vec![event];
        outbox_repo
            .expect_claim_ready()
            .returning(move |_, _, _| Ok(batch.clone()));
        outbox_repo
            .expect_mark_sent()
            .withf(move |id, attempts, _| *id == event_id && *attempts == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut broker = MockChargeRequestPublisher::new();
        broker.expect_publish().returning(move |message| {
            assert_eq!(message.outbox_event_id, Some(event_id));
            Ok(())
        });

        let publisher = publisher_with(outbox_repo, broker, 10);
        let published = publisher.publish_pending(10).await.unwrap();
        assert_eq!(published, 1);
        assert_eq!(publisher.dead_lettered(), 0);
    }

    #[tokio::test]
    async fn failed_publish_schedules_backoff_retry() {
        let event = pending_event(0);
        let event_id = event.id;
        let now: DateTime<Utc> = NOW.parse().unwrap();

        let mut outbox_repo = MockOutboxRepository::new();
        let batch = vec![event];
        outbox_repo
            .expect_claim_ready()
            .returning(move |_, _, _| Ok(batch.clone()));
        outbox_repo
            .expect_mark_retry()
            .withf(move |id, attempts, _, next_attempt_at| {
                *id == event_id
                    && *attempts == 1
                    && *next_attempt_at == now + chrono::Duration::seconds(1)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut broker = MockChargeRequestPublisher::new();
        broker
            .expect_publish()
            .returning(|_| Err(anyhow::anyhow!("broker unavailable")));

        let publisher = publisher_with(outbox_repo, broker, 10);
        publisher.publish_pending(10).await.unwrap();
        assert_eq!(publisher.dead_lettered(), 0);
    }

    #[tokio::test]
    async fn exhausted_attempts_dead_letter_the_event() {
        // Third failure with max 3 goes straight to DEAD.
        let event = pending_event(2);
        let event_id = event.id;

        let mut outbox_repo = MockOutboxRepository::new();
        let batch = vec![event];
        outbox_repo
            .expect_claim_ready()
            .returning(move |_, _, _| Ok(batch.clone()));
        outbox_repo.expect_mark_retry().never();
        outbox_repo
            .expect_mark_dead()
            .withf(move |id, attempts, last_error, _| {
                *id == event_id && *attempts == 3 && last_error.contains("broker unavailable")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut broker = MockChargeRequestPublisher::new();
        broker
            .expect_publish()
            .returning(|_| Err(anyhow::anyhow!("broker unavailable")));

        let publisher = publisher_with(outbox_repo, broker, 3);
        publisher.publish_pending(10).await.unwrap();
        assert_eq!(publisher.dead_lettered(), 1);
    }

    #[tokio::test]
    async fn undeliverable_payload_counts_as_publish_failure() {
        let mut event = pending_event(0);
        event.payload = "{not json".to_string();

        let mut outbox_repo = MockOutboxRepository::new();
        let batch = vec![event];
        outbox_repo
            .expect_claim_ready()
            .returning(move |_, _, _| Ok(batch.clone()));
        outbox_repo
            .expect_mark_retry()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut broker = MockChargeRequestPublisher::new();
        broker.expect_publish().never();

        let publisher = publisher_with(outbox_repo, broker, 10);
        publisher.publish_pending(10).await.unwrap();
    }

    #[tokio::test]
    async fn later_attempts_use_longer_backoff() {
        let event = pending_event(5);
        let now: DateTime<Utc> = NOW.parse().unwrap();

        let mut outbox_repo = MockOutboxRepository::new();
        let batch = vec![event];
        outbox_repo
            .expect_claim_ready()
            .returning(move |_, _, _| Ok(batch.clone()));
        outbox_repo
            .expect_mark_retry()
            .withf(move |_, attempts, _, next_attempt_at| {
                *attempts == 6 && *next_attempt_at == now + chrono::Duration::minutes(15)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut broker = MockChargeRequestPublisher::new();
        broker
            .expect_publish()
            .returning(|_| Err(anyhow::anyhow!("timeout")));

        let publisher = publisher_with(outbox_repo, broker, 10);
        publisher.publish_pending(10).await.unwrap();
    }

    #[tokio::test]
    async fn health_reports_pending_and_dead_counts() {
        let mut outbox_repo = MockOutboxRepository::new();
        outbox_repo
            .expect_count_by_status()
            .withf(|status| *status == OutboxStatus::Pending)
            .returning(|_| Ok(4));
        outbox_repo
            .expect_count_by_status()
            .withf(|status| *status == OutboxStatus::Dead)
            .returning(|_| Ok(1));

        let publisher = publisher_with(outbox_repo, MockChargeRequestPublisher::new(), 10);
        let health = publisher.health().await.unwrap();
        assert_eq!(health.pending, 4);
        assert_eq!(health.dead, 1);
    }

    #[test]
    fn stored_errors_are_truncated() {
        let err = anyhow::anyhow!("x".repeat(5000));
        let stored = truncate_error(&err);
        assert_eq!(stored.chars().count(), MAX_STORED_ERROR_CHARS);
    }
}
