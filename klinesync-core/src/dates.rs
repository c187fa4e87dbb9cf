//! Inclusive calendar-date sequences.

use chrono::{Duration, NaiveDate};

/// Every date from `start` through `stop` inclusive, ascending.
///
/// Empty when `start > stop`.
pub fn date_range(start: NaiveDate, stop: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = start;
    while day <= stop {
        dates.push(day);
        day += Duration::days(1);
    }
    dates
}
