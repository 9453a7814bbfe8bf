use chrono::{DateTime, NaiveDate, Utc};

/// Time source injected everywhere the billing core needs the current instant
/// or calendar date, so tests can pin the clock.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in UTC. Due-renewal matching compares against
    /// this, never against local time.
    fn today_utc(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today_utc(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}
