pub mod charge_consumer;
pub mod outbox_publisher;
pub mod renewal_engine;
pub mod subscriptions;
pub mod transitions;
