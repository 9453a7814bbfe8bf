use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use renewflow::config::config_loader;
use renewflow::domain::time::SystemClock;
use renewflow::infrastructure::cache::memory::InMemorySubscriptionCache;
use renewflow::infrastructure::payments::simulated::SimulatedPaymentGateway;
use renewflow::infrastructure::postgres::postgres_connection;
use renewflow::infrastructure::postgres::repositories::{
    outbox::OutboxPostgres, renewal_attempts::RenewalAttemptPostgres,
    subscriptions::SubscriptionPostgres,
};
use renewflow::infrastructure::rabbitmq::{broker, consumer};
use renewflow::services::sweeps;
use renewflow::usecases::charge_consumer::ChargeResultConsumer;
use renewflow::usecases::outbox_publisher::OutboxPublisher;
use renewflow::usecases::renewal_engine::{DispatchMode, RenewalEngine};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("billing worker exited with error: {}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&config.database.url)?;
    info!("Postgres connection has been established");
    let db_pool = Arc::new(postgres_pool);

    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let outbox_repo = Arc::new(OutboxPostgres::new(Arc::clone(&db_pool)));
    let gateway = Arc::new(SimulatedPaymentGateway::new(Arc::clone(&db_pool)));
    let cache = Arc::new(InMemorySubscriptionCache::new());
    let clock = Arc::new(SystemClock);

    let mode = if config.billing.async_enabled {
        DispatchMode::Async
    } else {
        DispatchMode::Direct
    };
    info!(?mode, "billing worker starting");

    let engine = Arc::new(RenewalEngine::new(
        Arc::clone(&subscription_repo),
        Arc::clone(&outbox_repo),
        Arc::clone(&gateway),
        Arc::clone(&cache),
        Arc::clone(&clock),
        mode,
        chrono::Duration::minutes(config.billing.in_flight_lease_minutes),
    ));

    let mut tasks = Vec::new();

    if config.billing.async_enabled {
        let channel = broker::connect(&config.amqp).await?;
        info!("RabbitMQ connection has been established");

        let publisher = Arc::new(broker::RabbitChargeRequestPublisher::new(
            channel.clone(),
            &config.amqp,
        ));
        let outbox_publisher = Arc::new(OutboxPublisher::new(
            Arc::clone(&outbox_repo),
            publisher,
            Arc::clone(&clock),
            config.outbox.max_publish_attempts,
            chrono::Duration::seconds(config.outbox.claim_hold_secs),
        ));
        tasks.push(tokio::spawn(sweeps::run_outbox_sweep(
            outbox_publisher,
            config.outbox.batch_size,
            Duration::from_secs(config.outbox.sweep_secs),
        )));

        let attempt_repo = Arc::new(RenewalAttemptPostgres::new(Arc::clone(&db_pool)));
        let charge_consumer = Arc::new(ChargeResultConsumer::new(
            Arc::clone(&subscription_repo),
            attempt_repo,
            Arc::clone(&gateway),
            Arc::clone(&cache),
            Arc::clone(&clock),
        ));
        let queue = config.amqp.queue.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(error) = consumer::run_charge_consumer(channel, queue, charge_consumer).await
            {
                error!(error = ?error, "charge consumer loop exited");
            }
        }));
    }

    tasks.push(tokio::spawn(sweeps::run_renewal_sweep(
        Arc::clone(&engine),
        config.billing.renewal_batch_size,
        Duration::from_secs(config.billing.renewal_sweep_secs),
    )));
    tasks.push(tokio::spawn(sweeps::run_cancellation_sweep(
        Arc::clone(&engine),
        config.billing.cancellation_batch_size,
        Duration::from_secs(config.billing.cancellation_sweep_secs),
    )));

    for task in tasks {
        task.await?;
    }
    Ok(())
}
