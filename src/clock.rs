use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, Utc};

/// Source of "now" for session ages, report timestamps and default date ranges.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time in the user's local offset.
    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&Local).fixed_offset()
    }

    fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    /// 1 January of the current year.
    fn start_of_year(&self) -> NaiveDate {
        let today = self.today();
        NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to an instant and offset.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<FixedOffset>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc)
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now
    }
}
