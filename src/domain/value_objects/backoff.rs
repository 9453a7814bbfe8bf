use chrono::Duration;

/// Delay before retrying a declined renewal charge. The third decline
/// suspends the subscription, so attempts past 2 get no delay.
pub fn renewal_backoff(attempt_number: i32) -> Duration {
    match attempt_number {
        1 => Duration::minutes(15),
        2 => Duration::minutes(60),
        _ => Duration::zero(),
    }
}

/// Delay before retrying a failed outbox publish. Deterministic on purpose:
/// no jitter, so test and operational behavior stay predictable.
pub fn publish_backoff(attempt: i32) -> Duration {
    match attempt {
        1 => Duration::seconds(1),
        2 => Duration::seconds(5),
        3 => Duration::seconds(15),
        4 => Duration::minutes(1),
        5 => Duration::minutes(5),
        _ => Duration::minutes(15),
    }
}
