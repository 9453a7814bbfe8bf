use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::domain::gateways::broker::ChargeRequestPublisher;
use crate::domain::gateways::cache::SubscriptionCache;
use crate::domain::gateways::payments::PaymentGateway;
use crate::domain::repositories::outbox::OutboxRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::time::Clock;
use crate::usecases::outbox_publisher::OutboxPublisher;
use crate::usecases::renewal_engine::RenewalEngine;

/// Periodically claims and processes due renewals.
pub async fn run_renewal_sweep<S, O, G, C, K>(
    engine: Arc<RenewalEngine<S, O, G, C, K>>,
    batch_size: usize,
    interval: Duration,
) where
    S: SubscriptionRepository + 'static,
    O: OutboxRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    info!(interval_secs = interval.as_secs(), "starting renewal sweep loop");
    loop {
        match engine.process_due_renewals(batch_size).await {
            Ok(processed) if processed > 0 => {
                info!(processed, "renewal sweep: processed due renewals");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "renewal sweep: sweep failed");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Periodically finalizes expired scheduled cancellations.
pub async fn run_cancellation_sweep<S, O, G, C, K>(
    engine: Arc<RenewalEngine<S, O, G, C, K>>,
    batch_size: usize,
    interval: Duration,
) where
    S: SubscriptionRepository + 'static,
    O: OutboxRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    info!(
        interval_secs = interval.as_secs(),
        "starting cancellation sweep loop"
    );
    loop {
        match engine.finalize_scheduled_cancellations(batch_size).await {
            Ok(finalized) if finalized > 0 => {
                info!(finalized, "cancellation sweep: finalized cancellations");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "cancellation sweep: sweep failed");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Periodically drains ready outbox events to the broker.
pub async fn run_outbox_sweep<O, P, K>(
    publisher: Arc<OutboxPublisher<O, P, K>>,
    batch_size: i64,
    interval: Duration,
) where
    O: OutboxRepository + 'static,
    P: ChargeRequestPublisher + 'static,
    K: Clock + 'static,
{
    info!(interval_secs = interval.as_secs(), "starting outbox sweep loop");
    loop {
        match publisher.publish_pending(batch_size).await {
            Ok(published) if published > 0 => {
                info!(published, "outbox sweep: drained ready events");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "outbox sweep: sweep failed");
            }
        }

        tokio::time::sleep(interval).await;
    }
}
