pub mod outbox;
pub mod renewal_attempts;
pub mod subscriptions;
pub mod users;
