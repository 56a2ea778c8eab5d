//! Next-occurrence projection
//!
//! Calendar-correct date advancement for each frequency, plus the idempotent
//! roll-forward that heals stale projections at read time. Month arithmetic
//! goes through `chrono::Months`, which clamps to the shorter month's last
//! day (Jan 31 + 1 month = Feb 29 in a leap year).

use chrono::{Datelike, Days, Months, NaiveDate};
use tracing::warn;

use crate::models::Frequency;

/// Safety cap for the roll-forward loop. Weekly is the shortest cadence, so
/// this covers ten years of staleness; anything beyond it is corrupt data.
const MAX_ROLL_FORWARD_STEPS: u32 = 520;

fn days_in_month(date: NaiveDate) -> u32 {
    let first = date.with_day(1).unwrap_or(date);
    let next = first + Months::new(1);
    (next - first).num_days() as u32
}

/// Add calendar months with last-day clamping, then snap to `pay_day` when an
/// anchor is provided (itself clamped to the target month's length).
fn add_months_clamped(date: NaiveDate, months: u32, pay_day: Option<u32>) -> NaiveDate {
    let advanced = date + Months::new(months);
    match pay_day {
        Some(day) if day >= 1 => {
            let clamped = day.min(days_in_month(advanced));
            advanced
                .with_day(clamped)
                .unwrap_or(advanced)
        }
        _ => advanced,
    }
}

/// One frequency step past `last_seen`.
///
/// Returns None for irregular patterns, which have no projectable next date.
pub fn next_occurrence(
    last_seen: NaiveDate,
    frequency: Frequency,
    pay_day: Option<u32>,
) -> Option<NaiveDate> {
    match frequency {
        Frequency::Weekly => Some(last_seen + Days::new(7)),
        Frequency::BiWeekly => Some(last_seen + Days::new(14)),
        Frequency::SemiMonthly => {
            // Paid twice a month, fourteen days apart, anchored on pay_day
            // when one is recorded (default 1st/15th). A strict advance is
            // required so the roll-forward loop always makes progress.
            let first = pay_day.filter(|d| (1..=14).contains(d)).unwrap_or(1);
            let second = first + 14;
            if last_seen.day() < first {
                last_seen.with_day(first)
            } else if last_seen.day() < second {
                last_seen.with_day(second)
            } else {
                (last_seen + Months::new(1)).with_day(first)
            }
        }
        Frequency::Monthly => Some(add_months_clamped(last_seen, 1, pay_day)),
        Frequency::Quarterly => Some(add_months_clamped(last_seen, 3, pay_day)),
        Frequency::Yearly => Some(add_months_clamped(last_seen, 12, pay_day)),
        Frequency::Irregular => None,
    }
}

/// Project the next expected date on or after `today`.
///
/// Re-applies the frequency increment from `last_seen` until the result is
/// no longer in the past. Stale stored projections self-heal through this
/// path on every read without reprocessing history.
pub fn project_next(
    last_seen: NaiveDate,
    frequency: Frequency,
    pay_day: Option<u32>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let mut next = next_occurrence(last_seen, frequency, pay_day)?;

    let mut steps = 0;
    while next < today {
        match next_occurrence(next, frequency, pay_day) {
            Some(advanced) => next = advanced,
            None => return None,
        }
        steps += 1;
        if steps >= MAX_ROLL_FORWARD_STEPS {
            warn!(
                last_seen = %last_seen,
                frequency = %frequency,
                "Roll-forward exceeded step cap, clamping to today"
            );
            return Some(today);
        }
    }

    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_and_biweekly_steps() {
        assert_eq!(
            next_occurrence(date(2024, 3, 1), Frequency::Weekly, None),
            Some(date(2024, 3, 8))
        );
        assert_eq!(
            next_occurrence(date(2024, 3, 1), Frequency::BiWeekly, None),
            Some(date(2024, 3, 15))
        );
    }

    #[test]
    fn test_monthly_clamps_to_short_month() {
        assert_eq!(
            next_occurrence(date(2024, 1, 31), Frequency::Monthly, None),
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            next_occurrence(date(2023, 1, 31), Frequency::Monthly, None),
            Some(date(2023, 2, 28))
        );
    }

    #[test]
    fn test_monthly_snaps_to_pay_day() {
        // Clamped once through February, the pay-day anchor restores the 31st
        assert_eq!(
            next_occurrence(date(2024, 2, 29), Frequency::Monthly, Some(31)),
            Some(date(2024, 3, 31))
        );
        // Anchor beyond the month's length clamps to the last day
        assert_eq!(
            next_occurrence(date(2024, 3, 15), Frequency::Monthly, Some(31)),
            Some(date(2024, 4, 30))
        );
    }

    #[test]
    fn test_semi_monthly_alternates() {
        assert_eq!(
            next_occurrence(date(2024, 3, 10), Frequency::SemiMonthly, None),
            Some(date(2024, 3, 15))
        );
        assert_eq!(
            next_occurrence(date(2024, 3, 15), Frequency::SemiMonthly, None),
            Some(date(2024, 4, 1))
        );
        assert_eq!(
            next_occurrence(date(2024, 3, 28), Frequency::SemiMonthly, None),
            Some(date(2024, 4, 1))
        );
    }

    #[test]
    fn test_semi_monthly_honors_pay_day_anchor() {
        // Anchored on the 5th: paid on the 5th and the 19th
        assert_eq!(
            next_occurrence(date(2024, 3, 5), Frequency::SemiMonthly, Some(5)),
            Some(date(2024, 3, 19))
        );
        assert_eq!(
            next_occurrence(date(2024, 3, 19), Frequency::SemiMonthly, Some(5)),
            Some(date(2024, 4, 5))
        );
        // Anchors past mid-month fall back to the 1st/15th default
        assert_eq!(
            next_occurrence(date(2024, 3, 10), Frequency::SemiMonthly, Some(20)),
            Some(date(2024, 3, 15))
        );
    }

    #[test]
    fn test_irregular_has_no_projection() {
        assert_eq!(
            next_occurrence(date(2024, 3, 1), Frequency::Irregular, None),
            None
        );
        assert_eq!(
            project_next(date(2024, 3, 1), Frequency::Irregular, None, date(2024, 6, 1)),
            None
        );
    }

    #[test]
    fn test_roll_forward_monthly() {
        // Stale by four and a half months: first monthly occurrence >= today
        assert_eq!(
            project_next(date(2024, 1, 15), Frequency::Monthly, None, date(2024, 6, 1)),
            Some(date(2024, 6, 15))
        );
    }

    #[test]
    fn test_roll_forward_already_future_is_identity() {
        assert_eq!(
            project_next(date(2024, 5, 20), Frequency::Monthly, None, date(2024, 6, 1)),
            Some(date(2024, 6, 20))
        );
        // A projection landing exactly on today is kept
        assert_eq!(
            project_next(date(2024, 5, 1), Frequency::Monthly, None, date(2024, 6, 1)),
            Some(date(2024, 6, 1))
        );
    }

    #[test]
    fn test_roll_forward_weekly_terminates() {
        let projected =
            project_next(date(2020, 1, 1), Frequency::Weekly, None, date(2024, 6, 1)).unwrap();
        assert!(projected >= date(2024, 6, 1));
        assert!(projected < date(2024, 6, 8));
    }
}
