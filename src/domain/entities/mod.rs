pub mod outbox_events;
pub mod payment_profiles;
pub mod renewal_attempts;
pub mod subscriptions;
