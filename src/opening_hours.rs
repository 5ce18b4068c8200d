//! Decide whether a venue is open at the moment a search asks about.
//!
//! Hours arrive as weekly periods in venue-local time (day 0 is Sunday). A period without a close
//! means the venue never closes. Missing data never excludes a venue.

use crate::types::{Candidate, SearchIntent, SearchQuery};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub const MINUTES_PER_DAY: u32 = 24 * 60;
const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct DayTime {
    pub day: u8,
    pub hour: u8,
    #[serde(default)]
    pub minute: u8,
}

impl DayTime {
    fn minute_of_week(self) -> Option<u32> {
        // 24:00 is how some providers spell midnight at the end of a day
        let valid = self.day < 7
            && self.minute < 60
            && (self.hour < 24 || (self.hour == 24 && self.minute == 0));
        valid.then(|| {
            self.day as u32 * MINUTES_PER_DAY + self.hour as u32 * 60 + self.minute as u32
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Period {
    pub open: DayTime,
    #[serde(default)]
    pub close: Option<DayTime>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct OpeningHours {
    /// Live signal from the place provider, only meaningful for "right now".
    #[serde(default)]
    pub open_now: Option<bool>,
    #[serde(default)]
    pub periods: Vec<Period>,
}

/// Minutes `[start, end)` of a single weekday during which the venue is open.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Interval {
    pub day: u8,
    pub start: u32,
    pub end: u32,
}

impl Interval {
    fn contains(&self, day: u8, minute: u32) -> bool {
        self.day == day && self.start <= minute && minute < self.end
    }
}

/// Expand weekly periods into day-scoped intervals. A period crossing midnight becomes a tail on
/// its opening day and a head on each following day up to its close.
pub fn intervals(periods: &[Period]) -> Vec<Interval> {
    let mut out = Vec::new();
    for period in periods {
        let Some(open) = period.open.minute_of_week() else {
            continue;
        };
        let close = match period.close {
            None => {
                out.extend((0..7).map(|day| Interval {
                    day,
                    start: 0,
                    end: MINUTES_PER_DAY,
                }));
                continue;
            }
            Some(close) => match close.minute_of_week() {
                Some(close) if close > open => close,
                Some(close) => close + MINUTES_PER_WEEK,
                None => continue,
            },
        };

        let mut cursor = open;
        while cursor < close {
            let day_index = cursor / MINUTES_PER_DAY;
            let day_start = day_index * MINUTES_PER_DAY;
            let end = close.min(day_start + MINUTES_PER_DAY);
            out.push(Interval {
                day: (day_index % 7) as u8,
                start: cursor - day_start,
                end: end - day_start,
            });
            cursor = end;
        }
    }
    out
}

/// Whether the hours cover `minute` on weekday `day` (0 = Sunday).
pub fn open_at(hours: &OpeningHours, day: u8, minute: u32) -> bool {
    if hours.periods.is_empty() {
        return true;
    }
    intervals(&hours.periods)
        .iter()
        .any(|interval| interval.contains(day, minute))
}

fn offset(minutes: Option<i32>) -> Option<UtcOffset> {
    minutes.and_then(|m| UtcOffset::from_whole_seconds(m.checked_mul(60)?).ok())
}

/// Whether a venue is open for the requested moment.
///
/// `now` is the reference clock used when the request means "right now" and the venue's offset is
/// unknown.
pub fn is_open(
    hours: Option<&OpeningHours>,
    venue_offset_minutes: Option<i32>,
    query: &SearchQuery,
    now: OffsetDateTime,
) -> bool {
    let Some(hours) = hours else {
        return true;
    };

    let local = match query.intent {
        SearchIntent::NextAvailable => {
            if let Some(open_now) = hours.open_now {
                return open_now;
            }
            let now = match offset(venue_offset_minutes) {
                Some(venue) => now.to_offset(venue),
                None => now,
            };
            PrimitiveDateTime::new(now.date(), now.time())
        }
        SearchIntent::SpecificTime => {
            let Some(time) = query.time else {
                return true;
            };
            let requested = PrimitiveDateTime::new(query.date, time);
            match (
                offset(query.utc_offset_minutes),
                offset(venue_offset_minutes),
            ) {
                (Some(from), Some(to)) => {
                    let shifted = requested.assume_offset(from).to_offset(to);
                    PrimitiveDateTime::new(shifted.date(), shifted.time())
                }
                _ => requested,
            }
        }
    };

    let day = local.weekday().number_days_from_sunday();
    let minute = local.hour() as u32 * 60 + local.minute() as u32;
    open_at(hours, day, minute)
}

pub fn candidate_is_open(candidate: &Candidate, query: &SearchQuery, now: OffsetDateTime) -> bool {
    is_open(
        candidate.opening_hours.as_ref(),
        candidate.utc_offset_minutes,
        query,
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};
    use time::Time;

    fn at(day: u8, hour: u8, minute: u8) -> DayTime {
        DayTime { day, hour, minute }
    }

    fn hours(periods: Vec<Period>) -> OpeningHours {
        OpeningHours {
            open_now: None,
            periods,
        }
    }

    fn query_at(date: time::Date, time: Time) -> SearchQuery {
        SearchQuery {
            location: "Austin, TX".to_string(),
            party_size: 2,
            date,
            time: Some(time),
            intent: SearchIntent::SpecificTime,
            preferences: None,
            cuisines: vec![],
            utc_offset_minutes: None,
        }
    }

    const NOW: OffsetDateTime = datetime!(2026-10-16 12:00 UTC);

    #[test]
    fn monday_daytime_hours() {
        let h = hours(vec![Period {
            open: at(1, 9, 0),
            close: Some(at(1, 22, 0)),
        }]);
        // 2026-10-19 is a Monday
        let monday = date!(2026 - 10 - 19);
        assert!(is_open(Some(&h), None, &query_at(monday, time!(21:30)), NOW));
        assert!(!is_open(Some(&h), None, &query_at(monday, time!(22:15)), NOW));
        assert!(!is_open(
            Some(&h),
            None,
            &query_at(date!(2026 - 10 - 20), time!(10:00)),
            NOW
        ));
    }

    #[test]
    fn close_minute_is_exclusive() {
        let h = hours(vec![Period {
            open: at(1, 9, 0),
            close: Some(at(1, 22, 0)),
        }]);
        assert!(open_at(&h, 1, 9 * 60));
        assert!(!open_at(&h, 1, 22 * 60));
    }

    #[test]
    fn overnight_period_is_split_at_midnight() {
        let periods = vec![Period {
            open: at(5, 18, 0),
            close: Some(at(6, 2, 0)),
        }];
        assert_eq!(
            intervals(&periods),
            vec![
                Interval {
                    day: 5,
                    start: 18 * 60,
                    end: MINUTES_PER_DAY
                },
                Interval {
                    day: 6,
                    start: 0,
                    end: 2 * 60
                },
            ]
        );
        let h = hours(periods);
        assert!(open_at(&h, 5, 23 * 60 + 59));
        assert!(open_at(&h, 6, 60));
        assert!(!open_at(&h, 6, 3 * 60));
        assert!(!open_at(&h, 5, 17 * 60));
    }

    #[test]
    fn saturday_into_sunday_wraps_the_week() {
        let h = hours(vec![Period {
            open: at(6, 20, 0),
            close: Some(at(0, 1, 30)),
        }]);
        assert!(open_at(&h, 6, 21 * 60));
        assert!(open_at(&h, 0, 60));
        assert!(!open_at(&h, 0, 2 * 60));
    }

    #[test]
    fn period_without_close_is_always_open() {
        let h = hours(vec![Period {
            open: at(0, 0, 0),
            close: None,
        }]);
        for day in 0..7 {
            assert!(open_at(&h, day, 3 * 60));
        }
    }

    #[test]
    fn missing_data_fails_open() {
        let q = query_at(date!(2026 - 10 - 19), time!(3:00));
        assert!(is_open(None, None, &q, NOW));
        assert!(is_open(Some(&hours(vec![])), None, &q, NOW));
    }

    #[test]
    fn next_available_trusts_live_signal() {
        let mut q = query_at(date!(2026 - 10 - 19), time!(12:00));
        q.intent = SearchIntent::NextAvailable;
        q.time = None;
        let h = OpeningHours {
            open_now: Some(false),
            periods: vec![Period {
                open: at(0, 0, 0),
                close: None,
            }],
        };
        assert!(!is_open(Some(&h), None, &q, NOW));
    }

    #[test]
    fn next_available_uses_venue_clock_without_live_signal() {
        let mut q = query_at(date!(2026 - 10 - 19), time!(12:00));
        q.intent = SearchIntent::NextAvailable;
        // Friday 2026-10-16 12:00 UTC is 07:00 in UTC-5
        let h = hours(vec![Period {
            open: at(5, 11, 0),
            close: Some(at(5, 23, 0)),
        }]);
        assert!(!is_open(Some(&h), Some(-300), &q, NOW));
        assert!(is_open(Some(&h), None, &q, NOW));
    }

    #[test]
    fn requested_time_is_shifted_into_venue_offset() {
        let mut q = query_at(date!(2026 - 10 - 19), time!(21:30));
        q.utc_offset_minutes = Some(-300);
        let h = hours(vec![Period {
            open: at(1, 9, 0),
            close: Some(at(1, 22, 0)),
        }]);
        // 21:30 in UTC-5 is 20:30 in UTC-6
        assert!(is_open(Some(&h), Some(-360), &q, NOW));
        // and 22:30 in UTC-4
        assert!(!is_open(Some(&h), Some(-240), &q, NOW));
    }
}
