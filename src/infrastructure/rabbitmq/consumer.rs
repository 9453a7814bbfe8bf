use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;
use lapin::{
    Channel,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions},
    types::FieldTable,
};
use tracing::{error, warn};

use crate::domain::gateways::cache::SubscriptionCache;
use crate::domain::gateways::payments::PaymentGateway;
use crate::domain::repositories::renewal_attempts::RenewalAttemptRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::time::Clock;
use crate::domain::value_objects::charge_requests::PaymentChargeRequested;
use crate::usecases::charge_consumer::ChargeResultConsumer;

/// Drains the charge queue into the consumer use case.
///
/// A handler error is nacked without requeue: the subscription's in-flight
/// lease expires on its own and the next renewal sweep re-enqueues the work,
/// so immediate redelivery would only spin on the same failure.
pub async fn run_charge_consumer<S, A, G, C, K>(
    channel: Channel,
    queue: String,
    usecase: Arc<ChargeResultConsumer<S, A, G, C, K>>,
) -> Result<()>
where
    S: SubscriptionRepository + 'static,
    A: RenewalAttemptRepository + 'static,
    G: PaymentGateway + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    let mut consumer = channel
        .basic_consume(
            &queue,
            "renewflow-charge-consumer",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                error!(error = %err, "charge_consumer: delivery error");
                continue;
            }
        };

        let message = match serde_json::from_slice::<PaymentChargeRequested>(&delivery.data) {
            Ok(message) => message,
            Err(err) => {
                // Undecodable message: redelivery cannot help, drop it.
                warn!(error = %err, "charge_consumer: dropping malformed message");
                delivery.ack(BasicAckOptions::default()).await?;
                continue;
            }
        };

        match usecase.handle(&message).await {
            Ok(()) => {
                delivery.ack(BasicAckOptions::default()).await?;
            }
            Err(err) => {
                error!(
                    subscription_id = %message.subscription_id,
                    attempt = message.attempt_number,
                    error = ?err,
                    "charge_consumer: handler failed, relying on lease expiry for retry"
                );
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
            }
        }
    }

    Ok(())
}
