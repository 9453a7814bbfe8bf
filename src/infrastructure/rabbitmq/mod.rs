pub mod broker;
pub mod consumer;
