//! Schedule calculation.
//!
//! Turns the user-facing date/time/duration values into absolute local
//! instants. Nothing in here reads the clock; callers resolve "today"
//! themselves and pass it in.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone};

use crate::error::{Result, SessionError};

/// Format used for frame and video file stems.
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Absolute recording window for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub interval: TimeDelta,
}

impl Schedule {
    pub fn new(
        date: NaiveDate,
        time: NaiveTime,
        capture_duration_secs: u32,
        interval_secs: u32,
    ) -> Result<Self> {
        if capture_duration_secs == 0 {
            return Err(SessionError::invalid("capture duration must be positive"));
        }
        if interval_secs == 0 {
            return Err(SessionError::invalid("interval must be positive"));
        }

        let start = resolve_local(date, time)?;
        let end = start + TimeDelta::seconds(i64::from(capture_duration_secs));

        Ok(Self {
            start,
            end,
            interval: TimeDelta::seconds(i64::from(interval_secs)),
        })
    }

    /// Scheduled capture instants: `start`, `start + interval`, ... while `< end`.
    pub fn frame_times(&self) -> impl Iterator<Item = DateTime<Local>> {
        let Self {
            end, interval, ..
        } = *self;
        std::iter::successors(Some(self.start), move |t| Some(*t + interval))
            .take_while(move |t| *t < end)
    }

    pub fn frame_count(&self) -> u32 {
        let total = (self.end - self.start).num_seconds().unsigned_abs();
        let step = self.interval.num_seconds().unsigned_abs().max(1);
        u32::try_from(total.div_ceil(step)).unwrap_or(u32::MAX)
    }
}

/// Map a wall-clock date and time onto the local timezone.
///
/// A time repeated by a DST fold resolves to its first occurrence; a time
/// skipped by a DST gap does not exist and is rejected.
pub fn resolve_local(date: NaiveDate, time: NaiveTime) -> Result<DateTime<Local>> {
    let naive = date.and_time(time);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| SessionError::invalid(format!("{naive} does not exist in the local timezone")))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| SessionError::invalid(format!("start date {raw:?}: {e}")))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    let raw_trimmed = raw.trim();
    NaiveTime::parse_from_str(raw_trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw_trimmed, "%H:%M"))
        .map_err(|e| SessionError::invalid(format!("start time {raw:?}: {e}")))
}

/// Encoder frame rate: captured span over playback span, truncated.
pub fn frame_rate(capture_duration_secs: u32, video_duration_secs: u32) -> Result<u32> {
    if video_duration_secs == 0 {
        return Err(SessionError::invalid("video duration must be positive"));
    }
    match capture_duration_secs / video_duration_secs {
        0 => Err(SessionError::invalid(format!(
            "video duration {video_duration_secs}s exceeds capture duration {capture_duration_secs}s (frame rate would be 0)"
        ))),
        fps => Ok(fps),
    }
}

pub fn stamp(instant: &DateTime<Local>) -> String {
    instant.format(STAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 30, 0).unwrap()
    }

    #[test]
    fn window_spans_capture_duration_exactly() {
        for duration in [1, 59, 60, 3_600, 86_400 * 3] {
            let schedule = Schedule::new(date(), noon(), duration, 10).unwrap();
            assert_eq!(
                (schedule.end - schedule.start).num_seconds(),
                i64::from(duration)
            );
        }
    }

    #[test]
    fn rejects_zero_duration_and_interval() {
        assert!(matches!(
            Schedule::new(date(), noon(), 0, 10),
            Err(SessionError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Schedule::new(date(), noon(), 60, 0),
            Err(SessionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn frame_times_are_evenly_spaced_and_bounded() {
        let schedule = Schedule::new(date(), noon(), 60, 10).unwrap();
        let times: Vec<_> = schedule.frame_times().collect();

        assert_eq!(times.len(), 6);
        assert_eq!(times[0], schedule.start);
        for pair in times.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_seconds(), 10);
        }
        assert!(times.iter().all(|t| *t < schedule.end));
    }

    #[test]
    fn frame_count_rounds_up() {
        let schedule = Schedule::new(date(), noon(), 65, 10).unwrap();
        assert_eq!(schedule.frame_count(), 7);
        assert_eq!(schedule.frame_times().count(), 7);

        let schedule = Schedule::new(date(), noon(), 5, 10).unwrap();
        assert_eq!(schedule.frame_count(), 1);
    }

    #[test]
    fn parses_both_time_forms() {
        assert_eq!(parse_time("12:30").unwrap(), noon());
        assert_eq!(parse_time("12:30:00").unwrap(), noon());
        assert_eq!(parse_time(" 07:05:09 ").unwrap(), NaiveTime::from_hms_opt(7, 5, 9).unwrap());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("noon").is_err());
    }

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2024-03-01").unwrap(), date());
        assert!(parse_date("01.03.2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn frame_rate_is_truncated_ratio() {
        assert_eq!(frame_rate(60, 60).unwrap(), 1);
        assert_eq!(frame_rate(3_600, 60).unwrap(), 60);
        assert_eq!(frame_rate(100, 30).unwrap(), 3);
    }

    #[test]
    fn frame_rate_guards_zero() {
        assert!(matches!(
            frame_rate(60, 0),
            Err(SessionError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            frame_rate(30, 60),
            Err(SessionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn stamp_is_sortable() {
        let schedule = Schedule::new(date(), noon(), 60, 10).unwrap();
        let stamps: Vec<_> = schedule.frame_times().map(|t| stamp(&t)).collect();
        assert_eq!(stamps[0], "20240301123000");
        assert_eq!(stamps[5], "20240301123050");
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(sorted, stamps);
    }
}
