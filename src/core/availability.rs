use crate::models::AvailabilitySlot;
use chrono::{DateTime, Datelike, NaiveTime, Utc};

/// Check whether a provider is available at the given instant
///
/// One-off entries for the exact date take precedence over recurring
/// entries for that weekday: an explicit `available: false` one-off blocks
/// its time range, and once any one-off exists for a date the recurring
/// schedule is ignored for it. No matching record means unavailable.
pub fn is_available_at(slots: &[AvailabilitySlot], at: DateTime<Utc>) -> bool {
    let date = at.date_naive();
    let time = at.time();

    let mut has_one_off_for_date = false;
    let mut one_off_allows = false;

    for slot in slots {
        if let AvailabilitySlot::OneOff {
            date: slot_date,
            start_time,
            end_time,
            available,
        } = slot
        {
            if *slot_date != date {
                continue;
            }
            has_one_off_for_date = true;

            if covers(time, *start_time, *end_time) {
                if !available {
                    // Explicit block wins over any other entry for the date
                    return false;
                }
                one_off_allows = true;
            }
        }
    }

    if has_one_off_for_date {
        return one_off_allows;
    }

    let weekday = date.weekday();
    slots.iter().any(|slot| match slot {
        AvailabilitySlot::Recurring {
            weekday: slot_weekday,
            start_time,
            end_time,
        } => *slot_weekday == weekday && covers(time, *start_time, *end_time),
        AvailabilitySlot::OneOff { .. } => false,
    })
}

/// Fraction of the given dates on which the provider is available, in [0, 1]
///
/// Returns None when no dates are supplied, so callers can distinguish
/// "never asked" from "asked and unavailable".
pub fn availability_fraction(
    slots: &[AvailabilitySlot],
    dates: &[DateTime<Utc>],
) -> Option<f64> {
    if dates.is_empty() {
        return None;
    }

    let available = dates
        .iter()
        .filter(|at| is_available_at(slots, **at))
        .count();

    Some(available as f64 / dates.len() as f64)
}

#[inline]
fn covers(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    time >= start && time < end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Weekday};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn recurring(weekday: Weekday, start: NaiveTime, end: NaiveTime) -> AvailabilitySlot {
        AvailabilitySlot::Recurring {
            weekday,
            start_time: start,
            end_time: end,
        }
    }

    fn one_off(date: NaiveDate, start: NaiveTime, end: NaiveTime, available: bool) -> AvailabilitySlot {
        AvailabilitySlot::OneOff {
            date,
            start_time: start,
            end_time: end,
            available,
        }
    }

    // 2025-06-02 is a Monday
    fn monday_at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn test_recurring_slot_covers_weekday() {
        let slots = vec![recurring(Weekday::Mon, t(9, 0), t(17, 0))];

        assert!(is_available_at(&slots, monday_at(10)));
        assert!(!is_available_at(&slots, monday_at(8)));
        // End of the slot is exclusive
        assert!(!is_available_at(&slots, monday_at(17)));

        // Tuesday, same hour
        let tuesday = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
        assert!(!is_available_at(&slots, tuesday));
    }

    #[test]
    fn test_one_off_overrides_recurring() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let slots = vec![
            recurring(Weekday::Mon, t(9, 0), t(17, 0)),
            // Morning off on this particular Monday
            one_off(date, t(9, 0), t(12, 0), false),
        ];

        assert!(!is_available_at(&slots, monday_at(10)));
        // Afternoon falls back to... nothing: a one-off exists for the date,
        // so the recurring schedule is ignored entirely
        assert!(!is_available_at(&slots, monday_at(14)));
    }

    #[test]
    fn test_one_off_extra_availability() {
        // No recurring schedule, but a one-off opening on a Sunday
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let slots = vec![one_off(date, t(10, 0), t(12, 0), true)];

        let sunday = Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap();
        assert!(is_available_at(&slots, sunday));

        let sunday_late = Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap();
        assert!(!is_available_at(&slots, sunday_late));
    }

    #[test]
    fn test_no_records_means_unavailable() {
        assert!(!is_available_at(&[], monday_at(10)));
    }

    #[test]
    fn test_availability_fraction() {
        let slots = vec![recurring(Weekday::Mon, t(9, 0), t(17, 0))];

        assert!(availability_fraction(&slots, &[]).is_none());

        let dates = vec![monday_at(10), monday_at(8)];
        let fraction = availability_fraction(&slots, &dates).unwrap();
        assert!((fraction - 0.5).abs() < 1e-9);
    }
}
