//! Live-window arithmetic
//!
//! A plan is live from `lead_time_hours` before its earliest service time
//! until the end of its local service day, or until the next plan of the same
//! group goes live, whichever comes first. Windows are half-open, so
//! consecutive windows of a group never share an instant.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` during which a plan is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LiveWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Timezone that defines where a service day ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    /// The host's local timezone
    #[default]
    Local,

    /// A fixed UTC offset
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Fixed boundary from an offset in minutes east of UTC
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::Fixed)
    }

    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    pub fn end_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Local => end_of_service_day(at, &Local),
            Self::Fixed(offset) => end_of_service_day(at, offset),
        }
    }

    pub fn next_time_of_day(&self, after: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
        match self {
            Self::Local => next_local_time(after, time, &Local),
            Self::Fixed(offset) => next_local_time(after, time, offset),
        }
    }

    pub fn compute_windows(&self, starts: &[DateTime<Utc>], lead_time_hours: u32) -> Vec<LiveWindow> {
        match self {
            Self::Local => compute_windows(starts, lead_time_hours, &Local),
            Self::Fixed(offset) => compute_windows(starts, lead_time_hours, offset),
        }
    }
}

/// Exclusive end of the service day `at` falls on in `tz`: the following
/// local midnight
pub fn end_of_service_day<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let fallback = at.checked_add_signed(Duration::days(1)).unwrap_or(DateTime::<Utc>::MAX_UTC);
    let Some(next) = at.with_timezone(tz).date_naive().succ_opt() else {
        return fallback;
    };

    // Midnight skipped by a DST transition: the first whole hour that exists
    (0..=3)
        .find_map(|hour| {
            let local = next.and_hms_opt(hour, 0, 0)?;
            tz.from_local_datetime(&local).earliest()
        })
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(fallback)
}

/// First instant strictly after `after` whose local time of day in `tz` is `time`
pub fn next_local_time<Tz: TimeZone>(after: DateTime<Utc>, time: NaiveTime, tz: &Tz) -> DateTime<Utc> {
    let mut date = after.with_timezone(tz).date_naive();

    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > after {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    after + Duration::days(1)
}

/// Start of the live window of a service beginning at `start`
///
/// `None` when the lead time reaches past the representable time range.
pub fn window_start(start: DateTime<Utc>, lead_time_hours: u32) -> Option<DateTime<Utc>> {
    start.checked_sub_signed(Duration::hours(i64::from(lead_time_hours)))
}

/// Live windows for a group's plans
///
/// `starts` are the plans' earliest service times in ascending order. Each
/// window ends at the end of its service day, cut short where the next
/// plan's window begins. A start that [`window_start`] cannot represent is
/// clamped to the earliest representable instant.
pub fn compute_windows<Tz: TimeZone>(
    starts: &[DateTime<Utc>],
    lead_time_hours: u32,
    tz: &Tz,
) -> Vec<LiveWindow> {
    let window_starts: Vec<DateTime<Utc>> = starts
        .iter()
        .map(|start| window_start(*start, lead_time_hours).unwrap_or(DateTime::<Utc>::MIN_UTC))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end_of_day = end_of_service_day(*start, tz);
            let end = match window_starts.get(i + 1) {
                Some(next_start) => end_of_day.min(*next_start),
                None => end_of_day,
            };
            LiveWindow {
                start: window_starts[i],
                end,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_single_plan_runs_to_end_of_day() {
        let windows = compute_windows(&[utc(2026, 3, 1, 9, 0)], 2, &Utc);

        assert_eq!(windows[0].start, utc(2026, 3, 1, 7, 0));
        assert_eq!(windows[0].end, utc(2026, 3, 2, 0, 0));
        assert!(windows[0].contains(utc(2026, 3, 1, 23, 59)));
        assert!(!windows[0].contains(utc(2026, 3, 2, 0, 0)));
    }

    #[test]
    fn test_same_day_plans_are_cut_at_next_start() {
        let windows = compute_windows(&[utc(2026, 3, 1, 9, 0), utc(2026, 3, 1, 18, 0)], 2, &Utc);

        assert_eq!(windows[0].end, utc(2026, 3, 1, 16, 0));
        assert_eq!(windows[1].start, utc(2026, 3, 1, 16, 0));

        // The shared boundary belongs to the later plan only
        let boundary = utc(2026, 3, 1, 16, 0);
        assert!(!windows[0].contains(boundary));
        assert!(windows[1].contains(boundary));
    }

    #[test]
    fn test_huge_lead_time_does_not_overflow() {
        assert_eq!(window_start(utc(2026, 3, 1, 9, 0), u32::MAX), None);
        assert_eq!(window_start(utc(2026, 3, 1, 9, 0), 3), Some(utc(2026, 3, 1, 6, 0)));

        let windows = compute_windows(&[utc(2026, 3, 1, 9, 0)], u32::MAX, &Utc);
        assert_eq!(windows[0].start, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_end_of_day_uses_local_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        // 02:00 UTC on March 2 is still March 1 at UTC-5
        let end = end_of_service_day(utc(2026, 3, 2, 2, 0), &offset);

        assert_eq!(end, utc(2026, 3, 2, 5, 0));
    }

    #[test]
    fn test_window_contains_is_half_open() {
        let window = LiveWindow {
            start: utc(2026, 3, 1, 7, 0),
            end: utc(2026, 3, 1, 12, 0),
        };

        assert!(window.contains(utc(2026, 3, 1, 7, 0)));
        assert!(window.contains(utc(2026, 3, 1, 11, 59)));
        assert!(!window.contains(utc(2026, 3, 1, 12, 0)));
    }

    #[test]
    fn test_next_local_time() {
        let time = NaiveTime::from_hms_opt(0, 0, 1).unwrap();

        assert_eq!(next_local_time(utc(2026, 3, 1, 15, 0), time, &Utc), utc(2026, 3, 2, 0, 0) + Duration::seconds(1));
        assert_eq!(
            next_local_time(utc(2026, 3, 1, 0, 0), time, &Utc),
            utc(2026, 3, 1, 0, 0) + Duration::seconds(1)
        );
    }

    #[test]
    fn test_day_boundary_from_offset() {
        let boundary = DayBoundary::from_offset_minutes(-300).unwrap();
        let end = boundary.end_of_day(utc(2026, 3, 2, 2, 0));

        assert_eq!(end, utc(2026, 3, 2, 5, 0));
        assert!(DayBoundary::from_offset_minutes(24 * 60).is_none());
    }
}
