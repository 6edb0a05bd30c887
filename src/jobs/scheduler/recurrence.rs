//! Typed cron-like recurrence rules and the `nextDate` calculator.
//!
//! Deliberately a bespoke enum of calendar rules rather than a generic
//! cron-expression parser: each variant's `next_date` algorithm is pinned
//! exactly (see the scheduling scenarios in the design notes), which a
//! general cron-expression evaluator would not let us state as plainly.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// A recurring schedule rule. All variants carrying a time-of-day also
/// carry the timezone that hour/minute are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Fires once per minute, at `second` past the minute.
    EveryMinute { second: u32 },
    /// Fires once per hour, at `minute` past the hour (UTC).
    Hourly { minute: u32 },
    /// Fires once per day at `hour:minute:00` in `tz`.
    Daily { hour: u32, minute: u32, tz: Tz },
    /// Fires once per week, on `weekday` at `hour:minute:00` in `tz`.
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
        tz: Tz,
    },
    /// Fires once per month, on `day_of_month` at `hour:minute:00` in
    /// `tz`. If a month is too short to contain `day_of_month`, that
    /// month's firing is skipped entirely (see [`Self::next_date`]).
    Monthly {
        day_of_month: u32,
        hour: u32,
        minute: u32,
        tz: Tz,
    },
}

/// Bound on how many months ahead `Monthly::next_date` will search for a
/// month long enough to contain the configured day. A year comfortably
/// covers any `day_of_month` up to 31 for any starting month.
const MAX_MONTHLY_LOOKAHEAD: u32 = 12;

impl Recurrence {
    /// The earliest instant strictly greater than `after` that matches
    /// this rule.
    pub fn next_date(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Recurrence::EveryMinute { second } => next_every_minute(after, second),
            Recurrence::Hourly { minute } => next_hourly(after, minute),
            Recurrence::Daily { hour, minute, tz } => next_daily(after, hour, minute, tz),
            Recurrence::Weekly {
                weekday,
                hour,
                minute,
                tz,
            } => next_weekly(after, weekday, hour, minute, tz),
            Recurrence::Monthly {
                day_of_month,
                hour,
                minute,
                tz,
            } => next_monthly(after, day_of_month, hour, minute, tz),
        }
    }
}

fn next_every_minute(after: DateTime<Utc>, second: u32) -> DateTime<Utc> {
    let candidate = after
        .with_second(second)
        .and_then(|d| d.with_nanosecond(0))
        .expect("second is in 0..60");

    if candidate > after {
        candidate
    } else {
        candidate + chrono::Duration::minutes(1)
    }
}

fn next_hourly(after: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    let candidate = after
        .with_minute(minute)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .expect("minute is in 0..60");

    if candidate > after {
        candidate
    } else {
        candidate + chrono::Duration::hours(1)
    }
}

fn at_time_in_tz(date: NaiveDate, hour: u32, minute: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive).single().map(|dt| dt.with_timezone(&Utc))
}

fn next_daily(after: DateTime<Utc>, hour: u32, minute: u32, tz: Tz) -> DateTime<Utc> {
    let local_date = after.with_timezone(&tz).date_naive();

    if let Some(candidate) = at_time_in_tz(local_date, hour, minute, tz) {
        if candidate > after {
            return candidate;
        }
    }

    let mut date = local_date.succ_opt().expect("calendar never overflows in practice");
    loop {
        if let Some(candidate) = at_time_in_tz(date, hour, minute, tz) {
            return candidate;
        }
        // A DST spring-forward can make a local time not exist on a given
        // day; try the next day instead of returning a wrong instant.
        date = date.succ_opt().expect("calendar never overflows in practice");
    }
}

fn next_weekly(
    after: DateTime<Utc>,
    weekday: Weekday,
    hour: u32,
    minute: u32,
    tz: Tz,
) -> DateTime<Utc> {
    let local_date = after.with_timezone(&tz).date_naive();

    for offset in 0..8 {
        let date = local_date + chrono::Duration::days(offset);
        if date.weekday() != weekday {
            continue;
        }
        if let Some(candidate) = at_time_in_tz(date, hour, minute, tz) {
            if candidate > after {
                return candidate;
            }
        }
    }

    unreachable!("a matching weekday occurs within any 8-day window");
}

fn next_monthly(after: DateTime<Utc>, day_of_month: u32, hour: u32, minute: u32, tz: Tz) -> DateTime<Utc> {
    let local = after.with_timezone(&tz);
    let mut year = local.year();
    let mut month = local.month();

    for attempt in 0..=MAX_MONTHLY_LOOKAHEAD {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day_of_month) {
            if let Some(candidate) = at_time_in_tz(date, hour, minute, tz) {
                if candidate > after || attempt > 0 {
                    return candidate;
                }
            }
        }

        if month == 12 {
            month = 1;
            year += 1;
        } else {
            month += 1;
        }
    }

    panic!("monthly recurrence found no valid firing within {MAX_MONTHLY_LOOKAHEAD} months");
}
