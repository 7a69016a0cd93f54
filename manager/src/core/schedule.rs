//! Next-run arithmetic for repeating tasks.
//!
//! Minutes and hours are absolute durations. Days and weeks move the local
//! wall clock (a 9:00 AM task stays at 9:00 AM across DST), months and years
//! move the calendar with end-of-month clamping.

use chrono::{DateTime, Days, Duration, Months, NaiveDateTime, TimeZone, Utc};

use crate::task::ScheduleInterval;

/// Calendar arithmetic fell outside chrono's supported range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schedule overflow advancing {from} by {count} {interval}")]
pub struct ScheduleOverflow {
    pub from: DateTime<Utc>,
    pub interval: ScheduleInterval,
    pub count: u32,
}

/// Units covered by one scheduling step (`skip_intervals + 1`).
pub fn step_units(skip_intervals: u32) -> u32 {
    skip_intervals.saturating_add(1)
}

/// Add `count` interval units to `at`, interpreting calendar units in `tz`.
pub fn add_units<Tz: TimeZone>(
    at: DateTime<Utc>,
    interval: ScheduleInterval,
    count: u32,
    tz: &Tz,
) -> Result<DateTime<Utc>, ScheduleOverflow> {
    let overflow = || ScheduleOverflow {
        from: at,
        interval,
        count,
    };
    match interval {
        ScheduleInterval::Minutes => at
            .checked_add_signed(Duration::minutes(i64::from(count)))
            .ok_or_else(overflow),
        ScheduleInterval::Hours => at
            .checked_add_signed(Duration::hours(i64::from(count)))
            .ok_or_else(overflow),
        ScheduleInterval::Days => {
            shift_local(at, tz, |local| local.checked_add_days(Days::new(u64::from(count))))
                .ok_or_else(overflow)
        }
        ScheduleInterval::Weeks => shift_local(at, tz, |local| {
            local.checked_add_days(Days::new(u64::from(count) * 7))
        })
        .ok_or_else(overflow),
        ScheduleInterval::Months => {
            shift_local(at, tz, |local| local.checked_add_months(Months::new(count)))
                .ok_or_else(overflow)
        }
        ScheduleInterval::Years => shift_local(at, tz, |local| {
            local.checked_add_months(Months::new(count.checked_mul(12)?))
        })
        .ok_or_else(overflow),
    }
}

/// Move `next_run` forward one step at a time until it is no longer before `now`.
///
/// A `next_run` already at or after `now` is returned unchanged.
pub fn advance_next_run<Tz: TimeZone>(
    next_run: DateTime<Utc>,
    interval: ScheduleInterval,
    skip_intervals: u32,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<DateTime<Utc>, ScheduleOverflow> {
    let step = step_units(skip_intervals);
    let mut next = next_run;
    if next >= now {
        return Ok(next);
    }

    if let Some(unit) = fixed_unit(interval) {
        // Fixed-length units: jump straight to the first slot at or after `now`.
        let overflow = || ScheduleOverflow {
            from: next_run,
            interval,
            count: step,
        };
        let step_ms = unit.num_milliseconds() * i64::from(step);
        let behind_ms = (now - next).num_milliseconds();
        let steps = (behind_ms + step_ms - 1) / step_ms;
        next = steps
            .checked_mul(step_ms)
            .and_then(Duration::try_milliseconds)
            .and_then(|jump| next.checked_add_signed(jump))
            .ok_or_else(overflow)?;
        while next < now {
            next = add_units(next, interval, step, tz)?;
        }
        return Ok(next);
    }

    while next < now {
        next = add_units(next, interval, step, tz)?;
    }
    Ok(next)
}

fn fixed_unit(interval: ScheduleInterval) -> Option<Duration> {
    match interval {
        ScheduleInterval::Minutes => Some(Duration::minutes(1)),
        ScheduleInterval::Hours => Some(Duration::hours(1)),
        _ => None,
    }
}

fn shift_local<Tz, F>(at: DateTime<Utc>, tz: &Tz, shift: F) -> Option<DateTime<Utc>>
where
    Tz: TimeZone,
    F: FnOnce(NaiveDateTime) -> Option<NaiveDateTime>,
{
    let local = at.with_timezone(tz).naive_local();
    let shifted = shift(local)?;
    resolve_local(tz, shifted)
}

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap move forward one hour.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt.with_timezone(&Utc));
    }
    let bumped = local.checked_add_signed(Duration::hours(1))?;
    tz.from_local_datetime(&bumped)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use chrono_tz::America::New_York;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn future_next_run_is_unchanged() {
        let next = utc(2030, 1, 1, 9, 0);
        let now = utc(2029, 12, 31, 9, 0);
        let out = advance_next_run(next, ScheduleInterval::Days, 0, now, &Utc).expect("advance");
        assert_eq!(out, next);
    }

    #[test]
    fn advances_weeks_with_skips() {
        let next = utc(2024, 1, 1, 9, 0);
        let now = utc(2024, 1, 1, 9, 1);
        let out = advance_next_run(next, ScheduleInterval::Weeks, 1, now, &Utc).expect("advance");
        assert_eq!(out, utc(2024, 1, 15, 9, 0));
    }

    #[test]
    fn catches_up_after_long_downtime_in_minutes() {
        let next = utc(2024, 1, 1, 0, 0);
        let now = utc(2024, 1, 1, 1, 7);
        let out =
            advance_next_run(next, ScheduleInterval::Minutes, 14, now, &Utc).expect("advance");
        // 15-minute steps: 01:00 is still before 01:07, so 01:15.
        assert_eq!(out, utc(2024, 1, 1, 1, 15));
    }

    #[test]
    fn equal_to_now_stops_advancing() {
        let next = utc(2024, 1, 1, 0, 0);
        let now = utc(2024, 1, 1, 2, 0);
        let out = advance_next_run(next, ScheduleInterval::Hours, 0, now, &Utc).expect("advance");
        assert_eq!(out, now);
    }

    #[test]
    fn months_clamp_to_end_of_month() {
        let next = utc(2024, 1, 31, 9, 0);
        let now = utc(2024, 2, 1, 0, 0);
        let out = advance_next_run(next, ScheduleInterval::Months, 0, now, &Utc).expect("advance");
        assert_eq!(out, utc(2024, 2, 29, 9, 0));
    }

    #[test]
    fn years_move_whole_calendar_years() {
        let next = utc(2020, 2, 29, 12, 0);
        let now = utc(2020, 3, 1, 0, 0);
        let out = advance_next_run(next, ScheduleInterval::Years, 0, now, &Utc).expect("advance");
        assert_eq!(out, utc(2021, 2, 28, 12, 0));
    }

    #[test]
    fn days_follow_the_local_wall_clock() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        // 09:00 local == 14:00 UTC.
        let next = utc(2024, 3, 1, 14, 0);
        let now = utc(2024, 3, 2, 0, 0);
        let out = advance_next_run(next, ScheduleInterval::Days, 0, now, &tz).expect("advance");
        assert_eq!(out, utc(2024, 3, 2, 14, 0));
    }

    #[test]
    fn resolve_local_maps_plain_times() {
        let local = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(resolve_local(&tz, local), Some(utc(2024, 6, 1, 7, 0)));
    }

    #[test]
    fn long_fixed_steps_are_not_truncated() {
        // One step of u32::MAX minutes is about 8166 years.
        let next = utc(-3000, 1, 1, 0, 0);
        let now = utc(2024, 1, 1, 0, 0);
        let out = advance_next_run(next, ScheduleInterval::Minutes, u32::MAX - 1, now, &Utc)
            .expect("advance");
        assert_eq!(out, next + Duration::minutes(i64::from(u32::MAX)));
    }

    #[test]
    fn fixed_steps_past_the_calendar_range_overflow() {
        let next = utc(2024, 1, 1, 0, 0);
        let now = utc(2024, 1, 1, 0, 1);
        let err = advance_next_run(next, ScheduleInterval::Hours, u32::MAX - 1, now, &Utc)
            .unwrap_err();
        assert_eq!(err.count, u32::MAX);
    }

    #[test]
    fn days_keep_wall_clock_across_spring_forward() {
        // 09:00 EST on Mar 9 2024; clocks jump to EDT on Mar 10.
        let next = utc(2024, 3, 9, 14, 0);
        let out = add_units(next, ScheduleInterval::Days, 1, &New_York).expect("add");
        assert_eq!(out, utc(2024, 3, 10, 13, 0));
    }

    #[test]
    fn weeks_keep_wall_clock_across_fall_back() {
        // 09:00 EDT on Oct 29 2024; clocks fall back to EST on Nov 3.
        let next = utc(2024, 10, 29, 13, 0);
        let now = utc(2024, 10, 30, 0, 0);
        let out =
            advance_next_run(next, ScheduleInterval::Weeks, 0, now, &New_York).expect("advance");
        assert_eq!(out, utc(2024, 11, 5, 14, 0));
    }

    #[test]
    fn hours_stay_absolute_across_spring_forward() {
        // 01:00 EST plus one hour is 03:00 EDT.
        let next = utc(2024, 3, 10, 6, 0);
        let out = add_units(next, ScheduleInterval::Hours, 1, &New_York).expect("add");
        assert_eq!(out, utc(2024, 3, 10, 7, 0));
    }

    #[test]
    fn days_landing_in_the_gap_move_forward_an_hour() {
        // 02:30 EST on Mar 9; 02:30 does not exist on Mar 10, so 03:30 EDT.
        let next = utc(2024, 3, 9, 7, 30);
        let out = add_units(next, ScheduleInterval::Days, 1, &New_York).expect("add");
        assert_eq!(out, utc(2024, 3, 10, 7, 30));
    }

    #[test]
    fn resolve_local_handles_gap_and_ambiguity() {
        let gap = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert_eq!(resolve_local(&New_York, gap), Some(utc(2024, 3, 10, 7, 30)));

        // 01:30 happens twice on Nov 3; the EDT instant comes first.
        let ambiguous = NaiveDate::from_ymd_opt(2024, 11, 3)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        assert_eq!(
            resolve_local(&New_York, ambiguous),
            Some(utc(2024, 11, 3, 5, 30))
        );
    }

    #[test]
    fn step_units_counts_skips() {
        assert_eq!(step_units(0), 1);
        assert_eq!(step_units(3), 4);
    }
}
