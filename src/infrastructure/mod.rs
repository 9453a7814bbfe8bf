pub mod cache;
pub mod payments;
pub mod postgres;
pub mod rabbitmq;
