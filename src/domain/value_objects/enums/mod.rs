pub mod outbox_statuses;
pub mod payment_behaviors;
pub mod plans;
pub mod renewal_attempt_results;
pub mod subscription_statuses;
