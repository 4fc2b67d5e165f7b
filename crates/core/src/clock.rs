use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

/// Source of "now" for every rule that depends on the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Site wall-clock time; booking check-in and check-out instants use this frame.
    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_utc()
    }

    fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { offset: utc_offset() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Frozen clock for deterministic tests and replays.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    instant: DateTime<Utc>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { instant, offset: utc_offset() }
    }

    /// Builds a clock whose site-local time is `local` in UTC.
    pub fn at_local(local: NaiveDateTime) -> Self {
        Self::at(local.and_utc())
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }

    fn local_now(&self) -> NaiveDateTime {
        self.instant.with_timezone(&self.offset).naive_local()
    }
}

impl<C> Clock for &C
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn local_now(&self) -> NaiveDateTime {
        (**self).local_now()
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn local_now(&self) -> NaiveDateTime {
        (**self).local_now()
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

    use super::{Clock, FixedClock};

    #[test]
    fn fixed_clock_applies_site_offset_to_local_time() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 2, 22, 30, 0).single().expect("valid instant");
        let offset = FixedOffset::east_opt(8 * 3600).expect("valid offset");
        let clock = FixedClock::at(instant).with_offset(offset);

        assert_eq!(clock.now(), instant);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 6, 3).expect("valid date"));
    }

    #[test]
    fn at_local_keeps_wall_clock_time() {
        let local = NaiveDate::from_ymd_opt(2025, 6, 1)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid local time");
        let clock = FixedClock::at_local(local);

        assert_eq!(clock.local_now(), local);
    }
}
