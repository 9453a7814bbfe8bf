use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};
use tracing::info;

use crate::config::config_model::Amqp;
use crate::domain::gateways::broker::ChargeRequestPublisher;
use crate::domain::value_objects::charge_requests::PaymentChargeRequested;

/// Declares the durable exchange/queue/binding triple and returns a channel
/// ready for publishing and consuming.
pub async fn connect(config: &Amqp) -> Result<Channel> {
    let connection = Connection::connect(&config.url, ConnectionProperties::default())
        .await
        .context("failed to connect to RabbitMQ")?;

    let channel = connection
        .create_channel()
        .await
        .context("failed to open RabbitMQ channel")?;

    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &config.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(
        exchange = %config.exchange,
        queue = %config.queue,
        routing_key = %config.routing_key,
        "rabbitmq: declared payments topology"
    );

    Ok(channel)
}

pub struct RabbitChargeRequestPublisher {
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl RabbitChargeRequestPublisher {
    pub fn new(channel: Channel, config: &Amqp) -> Self {
        Self {
            channel,
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
        }
    }
}

#[async_trait]
impl ChargeRequestPublisher for RabbitChargeRequestPublisher {
    async fn publish(&self, message: PaymentChargeRequested) -> Result<()> {
        let payload = serde_json::to_vec(&message)?;

        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await
            .context("broker did not confirm publish")?;

        Ok(())
    }
}
