use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::entities::outbox_events::InsertOutboxEventEntity;
use crate::domain::entities::renewal_attempts::InsertRenewalAttemptEntity;
use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::domain::gateways::cache::SubscriptionCache;
use crate::domain::gateways::payments::{ChargeOutcome, PaymentGateway};
use crate::domain::repositories::outbox::{EnqueueOutcome, OutboxRepository};
use crate::domain::repositories::subscriptions::{ApplyOutcome, SubscriptionRepository};
use crate::domain::time::Clock;
use crate::domain::value_objects::charge_requests::PaymentChargeRequested;
use crate::domain::value_objects::enums::outbox_statuses::OutboxStatus;
use crate::domain::value_objects::enums::plans::Plan;
use crate::domain::value_objects::enums::renewal_attempt_results::RenewalAttemptResult;
use crate::usecases::transitions;

pub const OUTBOX_AGGREGATE_TYPE: &str = "SUBSCRIPTION";
pub const CHARGE_REQUESTED_EVENT: &str = "CHARGE_REQUESTED";

/// How a claimed renewal gets charged. `Direct` calls the gateway inline and
/// applies the outcome in place; `Async` enqueues a CHARGE_REQUESTED outbox
/// event and lets the consumer apply the outcome later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Direct,
    Async,
}

pub struct RenewalEngine<S, O, G, C, K>
where
    S: SubscriptionRepository + 'static,
    O: OutboxRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    subscription_repo: Arc<S>,
    outbox_repo: Arc<O>,
    gateway: Arc<G>,
    cache: Arc<C>,
    clock: Arc<K>,
    mode: DispatchMode,
    in_flight_lease: chrono::Duration,
}

impl<S, O, G, C, K> RenewalEngine<S, O, G, C, K>
where
    S: SubscriptionRepository + 'static,
    O: OutboxRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscription_repo: Arc<S>,
        outbox_repo: Arc<O>,
        gateway: Arc<G>,
        cache: Arc<C>,
        clock: Arc<K>,
        mode: DispatchMode,
        in_flight_lease: chrono::Duration,
    ) -> Self {
        Self {
            subscription_repo,
            outbox_repo,
            gateway,
            cache,
            clock,
            mode,
            in_flight_lease,
        }
    }

    /// Claims and processes due renewals one at a time until the due set is
    /// drained or `max` claims were made. A failure on one subscription is
    /// logged and does not stop the sweep; the lease stamped at claim time
    /// brings the row back after expiry.
    pub async fn process_due_renewals(&self, max: usize) -> Result<usize> {
        let mut processed = 0;

        while processed < max {
            let now = self.clock.now();
            let today = self.clock.today_utc();
            let lease_until = now + self.in_flight_lease;

            let claimed = self
                .subscription_repo
                .claim_one_due_for_renewal(today, now, lease_until)
                .await?;
            let Some(subscription) = claimed else {
                break;
            };
            processed += 1;

            let subscription_id = subscription.id;
            if let Err(err) = self.process_one(subscription).await {
                error!(
                    %subscription_id,
                    error = ?err,
                    "renewal engine: renewal attempt failed, lease will expire"
                );
            }
        }

        Ok(processed)
    }

    async fn process_one(&self, subscription: SubscriptionEntity) -> Result<()> {
        let attempt_number = subscription.renewal_failures + 1;
        let plan = Plan::from_str(&subscription.plan)
            .with_context(|| format!("unknown plan {}", subscription.plan))?;
        let amount_cents = plan.price_cents();

        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            attempt_number,
            amount_cents,
            mode = ?self.mode,
            "renewal engine: processing due renewal"
        );

        match self.mode {
            DispatchMode::Direct => {
                self.charge_directly(subscription, attempt_number, amount_cents)
                    .await
            }
            DispatchMode::Async => {
                self.enqueue_charge_request(subscription, attempt_number, amount_cents)
                    .await
            }
        }
    }

    async fn charge_directly(
        &self,
        subscription: SubscriptionEntity,
        attempt_number: i32,
        amount_cents: i32,
    ) -> Result<()> {
        let outcome = self
            .gateway
            .charge(subscription.user_id, amount_cents)
            .await?;
        let now = self.clock.now();
        let attempt = attempt_insert(&subscription, attempt_number, amount_cents, now, &outcome);

        let mut updated = subscription.clone();
        match outcome {
            ChargeOutcome::Approved => {
                transitions::apply_approved_charge(&mut updated, now)?;
                info!(
                    subscription_id = %updated.id,
                    new_expiration = %updated.expiration_date,
                    "renewal engine: charge approved, renewing cycle"
                );
            }
            ChargeOutcome::Declined { ref code, .. } => {
                transitions::apply_declined_charge(&mut updated, attempt_number, now);
                warn!(
                    subscription_id = %updated.id,
                    attempt_number,
                    decline_code = %code,
                    status = %updated.status,
                    "renewal engine: charge declined"
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
                // Another processor already recorded this exact attempt;
                // release the lease without touching the subscription.
                debug!(
                    subscription_id = %subscription.id,
                    attempt_number,
                    "renewal engine: attempt already recorded elsewhere, releasing lease"
                );
                let mut release = subscription;
                release.renewal_in_flight_until = None;
                release.updated_at = now;
                if !self.subscription_repo.save(release).await? {
                    debug!(%user_id, "renewal engine: lease release lost a version race");
                }
            }
            ApplyOutcome::VersionConflict => {
                // Attempt rolled back with the conflict, so the charge stays
                // replayable once the lease expires.
                warn!(
                    %user_id,
                    attempt_number,
                    "renewal engine: subscription changed concurrently, outcome not applied"
                );
            }
        }
        self.cache.evict_active(user_id);
        Ok(())
    }

    async fn enqueue_charge_request(
        &self,
        subscription: SubscriptionEntity,
        attempt_number: i32,
        amount_cents: i32,
    ) -> Result<()> {
        let now = self.clock.now();
        let message = PaymentChargeRequested {
            outbox_event_id: None,
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            cycle_expiration_date: subscription.expiration_date,
            attempt_number,
            amount_cents,
            requested_at: now,
        };

        let insert = InsertOutboxEventEntity {
            id: Uuid::new_v4(),
            aggregate_type: OUTBOX_AGGREGATE_TYPE.to_string(),
            aggregate_id: subscription.id,
            event_type: CHARGE_REQUESTED_EVENT.to_string(),
            idempotency_key: message.idempotency_key(),
            payload: serde_json::to_string(&message)
                .context("failed to serialize charge request payload")?,
            status: OutboxStatus::Pending.to_string(),
            publish_attempts: 0,
            created_at: now,
            next_attempt_at: now,
        };

        match self.outbox_repo.enqueue(insert).await? {
            EnqueueOutcome::Enqueued => {
                info!(
                    subscription_id = %subscription.id,
                    attempt_number,
                    "renewal engine: charge request enqueued"
                );
            }
            EnqueueOutcome::AlreadyEnqueued => {
                debug!(
                    subscription_id = %subscription.id,
                    attempt_number,
                    "renewal engine: charge request already enqueued"
                );
            }
        }
        Ok(())
    }

    /// Finalizes expired scheduled cancellations. The claim statement does the
    /// CANCEL_SCHEDULED to CANCELED transition; this loop only logs and evicts.
    pub async fn finalize_scheduled_cancellations(&self, max: usize) -> Result<usize> {
        let mut finalized = 0;

        while finalized < max {
            let now = self.clock.now();
            let today = self.clock.today_utc();

            let claimed = self
                .subscription_repo
                .claim_one_due_for_finalization(today, now)
                .await?;
            let Some(subscription) = claimed else {
                break;
            };
            finalized += 1;

            self.cache.evict_active(subscription.user_id);
            info!(
                subscription_id = %subscription.id,
                user_id = %subscription.user_id,
                expired_on = %subscription.expiration_date,
                "renewal engine: scheduled cancellation finalized"
            );
        }

        Ok(finalized)
    }
}

fn attempt_insert(
    subscription: &SubscriptionEntity,
    attempt_number: i32,
    amount_cents: i32,
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
        subscription_id: subscription.id,
        cycle_expiration_date: subscription.expiration_date,
        attempt_number,
        attempted_at,
        result: result.to_string(),
        amount_cents,
        error_code,
        error_message,
    }
}
