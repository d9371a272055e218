//! The request's time window: the previous full calendar year.

use std::fmt;

use chrono::{Datelike, NaiveDate, Utc};

/// Source of "today".
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The system clock, in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock stuck on one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// January 1st to December 31st of the year before `today`.
    pub fn previous_year(today: NaiveDate) -> Self {
        let year = today.year() - 1;
        // Jan 1 and Dec 31 exist in every year chrono can represent
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    pub fn from_clock(clock: &dyn Clock) -> Self {
        Self::previous_year(clock.today())
    }

    /// `YYYY-MM-DD/YYYY-MM-DD`, as STAC `datetime` expects.
    pub fn to_catalog_string(&self) -> String {
        format!("{}/{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_catalog_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn previous_full_year() {
        let w = TimeWindow::previous_year(date(2025, 6, 15));
        assert_eq!(w.to_catalog_string(), "2024-01-01/2024-12-31");
    }

    #[test]
    fn new_years_day_still_uses_last_year() {
        let w = TimeWindow::from_clock(&FixedClock(date(2025, 1, 1)));
        assert_eq!(w.start, date(2024, 1, 1));
        assert_eq!(w.end, date(2024, 12, 31));
        assert_eq!(w.to_string(), "2024-01-01/2024-12-31");
    }
}
