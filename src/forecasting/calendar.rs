use chrono::{Datelike, Months, NaiveDate};

use super::ModelError;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Fractional days since the Unix epoch; the time axis seasonal terms are evaluated on.
pub fn days_since_epoch(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// First day of each of the `periods` months strictly after `last`'s month.
///
/// `2024-01-15` with 3 periods yields `2024-02-01, 2024-03-01, 2024-04-01`.
pub fn month_starts_after(last: NaiveDate, periods: usize) -> Result<Vec<NaiveDate>, ModelError> {
    let (year, month) = if last.month() == 12 {
        (last.year() + 1, 1)
    } else {
        (last.year(), last.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(ModelError::DateOutOfRange(last))?;

    (0..periods)
        .map(|offset| {
            let offset = u32::try_from(offset).map_err(|_| ModelError::DateOutOfRange(first))?;
            first
                .checked_add_months(Months::new(offset))
                .ok_or(ModelError::DateOutOfRange(first))
        })
        .collect()
}
