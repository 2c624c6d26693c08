//! Consecutive-day activity streak

use std::collections::BTreeSet;

use chrono::NaiveDate;

/// Count consecutive active days ending at `end_date`.
///
/// Walks backward from `end_date` and stops at the first date missing from
/// `active_dates`. Returns 0 when `end_date` itself is inactive. Runs in
/// O(streak) lookups once the set exists.
pub fn current_streak(active_dates: &BTreeSet<NaiveDate>, end_date: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = end_date;
    while active_dates.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn dates(days: &[u32]) -> BTreeSet<NaiveDate> {
        days.iter().map(|d| day(*d)).collect()
    }

    #[test]
    fn test_streak_breaks_at_gap() {
        // Active on 5, 6, 8, 9, 10; day 7 missing
        assert_eq!(current_streak(&dates(&[5, 6, 8, 9, 10]), day(10)), 3);
    }

    #[test]
    fn test_inactive_end_day_is_zero() {
        assert_eq!(current_streak(&dates(&[4, 5, 6, 7, 8, 9]), day(10)), 0);
    }

    #[test]
    fn test_full_run() {
        assert_eq!(current_streak(&dates(&[7, 8, 9, 10]), day(10)), 4);
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(current_streak(&BTreeSet::new(), day(10)), 0);
    }

    #[test]
    fn test_crosses_month_boundary() {
        let mut active = dates(&[1, 2]);
        active.insert(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        active.insert(NaiveDate::from_ymd_opt(2024, 2, 27).unwrap());
        assert_eq!(current_streak(&active, day(2)), 3);
    }
}
