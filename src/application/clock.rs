use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

/// Source of "now". Injected so that date-sensitive rules can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day that date rules such as "already started" use. Defaults to the UTC day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock frozen at 09:00 UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self::new(Self::morning_of(date))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.set(Self::morning_of(date));
    }

    fn morning_of(date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(9, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
