use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;

/// Point in time as seen by the bot, carrying the offset of the configured timezone.
pub type Timestamp = DateTime<FixedOffset>;

/// Source of the current time. Sampled once per dispatched event.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock rendered in a fixed IANA timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().with_timezone(&self.tz).fixed_offset()
    }
}

/// Time between two instants; zero if `to` precedes `from`.
pub fn span(from: Timestamp, to: Timestamp) -> Duration {
    (to - from).to_std().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Clock that only moves when told to.
    pub struct ManualClock(Mutex<Timestamp>);

    impl ManualClock {
        pub fn new(start: Timestamp) -> Self {
            Self(Mutex::new(start))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock();
            *now += chrono::TimeDelta::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            *self.0.lock()
        }
    }
}
