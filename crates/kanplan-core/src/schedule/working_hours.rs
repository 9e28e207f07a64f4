//! Weekly working hours used to bound availability searches.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Working window for one weekday.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime, // HH:MM
    #[serde(with = "hhmm")]
    pub end: NaiveTime, // HH:MM
    pub enabled: bool,
}

impl DayHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            start: nine(),
            end: eighteen(),
            enabled: false,
        }
    }
}

/// Per-weekday working hours, Monday first.
///
/// Times of day are interpreted at a fixed UTC offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingHours {
    #[serde(default)]
    pub utc_offset_minutes: i32,
    pub days: [DayHours; 7],
}

fn nine() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn eighteen() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for WorkingHours {
    /// Monday to Friday, 09:00-18:00 UTC.
    fn default() -> Self {
        let weekday = DayHours::new(nine(), eighteen());
        Self {
            utc_offset_minutes: 0,
            days: [
                weekday,
                weekday,
                weekday,
                weekday,
                weekday,
                DayHours::disabled(),
                DayHours::disabled(),
            ],
        }
    }
}

impl WorkingHours {
    /// Same window on every day of the week.
    pub fn every_day(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            utc_offset_minutes: 0,
            days: [DayHours::new(start, end); 7],
        }
    }

    pub fn with_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    pub fn for_weekday(&self, weekday: Weekday) -> &DayHours {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn for_weekday_mut(&mut self, weekday: Weekday) -> &mut DayHours {
        &mut self.days[weekday.num_days_from_monday() as usize]
    }

    /// Offset used to interpret times of day; out-of-range values fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Local calendar date of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    /// Working window on `date`, or `None` when the day is disabled.
    pub fn window_on(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let day = self.for_weekday(date.weekday());
        if !day.enabled || day.start >= day.end {
            return None;
        }
        let offset = self.offset();
        let start = offset
            .from_local_datetime(&date.and_time(day.start))
            .single()?
            .with_timezone(&Utc);
        let end = offset
            .from_local_datetime(&date.and_time(day.end))
            .single()?
            .with_timezone(&Utc);
        Some((start, end))
    }

    /// Every enabled day must start before it ends.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (i, day) in self.days.iter().enumerate() {
            if day.enabled && day.start >= day.end {
                return Err(ValidationError::InvalidWorkingHours {
                    day: weekday_from_index(i),
                    start: day.start,
                    end: day.end,
                });
            }
        }
        if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
            return Err(ValidationError::InvalidValue {
                field: "utc_offset_minutes".into(),
                message: format!("{} is out of range", self.utc_offset_minutes),
            });
        }
        Ok(())
    }
}

fn weekday_from_index(i: usize) -> Weekday {
    match i {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Parse "HH:MM" (or "HH:MM:SS").
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("expected HH:MM, got '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn default_is_weekdays_only() {
        let hours = WorkingHours::default();
        assert!(hours.for_weekday(Weekday::Mon).enabled);
        assert!(hours.for_weekday(Weekday::Fri).enabled);
        assert!(!hours.for_weekday(Weekday::Sat).enabled);
        assert!(!hours.for_weekday(Weekday::Sun).enabled);
        assert!(hours.validate().is_ok());
    }

    #[test]
    fn window_respects_offset() {
        let hours = WorkingHours::every_day(t(9, 0), t(17, 0)).with_offset_minutes(120);
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        let (start, end) = hours.window_on(date).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 4, 7, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 4, 15, 0, 0).unwrap());
    }

    #[test]
    fn disabled_day_has_no_window() {
        let hours = WorkingHours::default();
        // 2026-03-07 is a Saturday
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert!(hours.window_on(date).is_none());
    }

    #[test]
    fn validate_rejects_inverted_day() {
        let mut hours = WorkingHours::default();
        *hours.for_weekday_mut(Weekday::Tue) = DayHours::new(t(18, 0), t(9, 0));
        assert!(matches!(
            hours.validate(),
            Err(ValidationError::InvalidWorkingHours { day: Weekday::Tue, .. })
        ));
    }

    #[test]
    fn serializes_times_as_hhmm() {
        let json = serde_json::to_string(&DayHours::new(t(9, 30), t(17, 45))).unwrap();
        assert!(json.contains("\"09:30\""));
        let back: DayHours = serde_json::from_str(&json).unwrap();
        assert_eq!(back.start, t(9, 30));
    }
}
