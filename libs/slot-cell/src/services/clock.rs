use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

/// Wall-clock source in the reference timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReferenceClock {
    offset: FixedOffset,
}

impl ReferenceClock {
    /// Falls back to UTC when the offset is out of range.
    pub fn from_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Clock for ReferenceClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
