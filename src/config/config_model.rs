#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub database: Database,
    pub amqp: Amqp,
    pub billing: Billing,
    pub outbox: Outbox,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Amqp {
    pub url: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

#[derive(Debug, Clone)]
pub struct Billing {
    /// false: charge inline during the renewal sweep; true: hand off through
    /// the outbox and the charge queue.
    pub async_enabled: bool,
    pub renewal_batch_size: usize,
    pub renewal_sweep_secs: u64,
    pub cancellation_batch_size: usize,
    pub cancellation_sweep_secs: u64,
    pub in_flight_lease_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    pub batch_size: i64,
    pub sweep_secs: u64,
    pub max_publish_attempts: i32,
    pub claim_hold_secs: i64,
}
