//! Time sources injected into the workflow service
use super::types::TimeStamp;
use chrono::Utc;

pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::new()
    }
}

/// Always returns the same instant. Useful for reproducible records.
#[derive(Debug, Clone)]
pub struct FixedClock(pub TimeStamp<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> TimeStamp<Utc> {
        self.0.clone()
    }
}
