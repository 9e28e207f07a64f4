//! Shared setup for commands that touch the planner.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use kanplan_core::calendar::CalendarEvent;
use kanplan_core::error::{StorageError, ValidationError};
use kanplan_core::storage::{load_json, save_json};
use kanplan_core::{Config, LocalCalendar, Planner, SqliteStore, WorkingHours};
use tokio::runtime::Runtime;

/// Store key of the local calendar snapshot.
pub const CALENDAR_KEY: &str = "calendar/local";

/// Planner plus the local calendar it mirrors into, backed by the data directory.
pub struct Session {
    pub planner: Planner,
    pub calendar: Arc<LocalCalendar>,
    store: Arc<SqliteStore>,
    runtime: Runtime,
}

impl Session {
    pub fn open() -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let store = Arc::new(SqliteStore::open()?);
        let events: Vec<CalendarEvent> = load_json(store.as_ref(), CALENDAR_KEY)?.unwrap_or_default();
        let calendar = Arc::new(LocalCalendar::from_events(config.calendar_id.clone(), events));
        let planner = Planner::new(config, store.clone(), calendar.clone())?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        tracing::debug!(
            calendar_id = %calendar.calendar_id(),
            events = calendar.events().len(),
            "session opened"
        );

        Ok(Self {
            planner,
            calendar,
            store,
            runtime,
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Write the calendar snapshot back after events were created or removed.
    pub fn save_calendar(&self) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), CALENDAR_KEY, &self.calendar.events())
    }
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`.
///
/// Local forms use the working-hours offset; a bare date means the end of
/// that day's working window (or of the day, when it is not a working day).
pub fn parse_datetime(input: &str, hours: &WorkingHours) -> Result<DateTime<Utc>, ValidationError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let invalid = || ValidationError::InvalidValue {
        field: "datetime".into(),
        message: format!("cannot parse '{input}'; use YYYY-MM-DD HH:MM or RFC 3339"),
    };
    let local = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok());
    let local = match local {
        Some(local) => local,
        None => {
            let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())?;
            if let Some((_, end)) = hours.window_on(date) {
                return Ok(end);
            }
            date.and_time(NaiveTime::from_hms_opt(23, 59, 0).ok_or_else(invalid)?)
        }
    };
    hours
        .offset()
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}

/// Parse `incubation,design,implementation,improvement` minutes.
pub fn parse_phase_minutes(input: &str) -> Result<[u32; 4], ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: "actual".into(),
        message: format!("expected four comma-separated minute values, got '{input}'"),
    };
    let values: Vec<u32> = input
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    <[u32; 4]>::try_from(values).map_err(|_| invalid())
}

/// Split a comma-separated list, dropping empty entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// First eight characters of a task id, or the whole id when shorter.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_and_rfc3339() {
        let hours = WorkingHours::default().with_offset_minutes(60);
        let expected = Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap();
        assert_eq!(parse_datetime("2026-03-04 10:30", &hours).unwrap(), expected);
        assert_eq!(parse_datetime("2026-03-04T09:30:00Z", &hours).unwrap(), expected);
        assert!(parse_datetime("tomorrow", &hours).is_err());
    }

    #[test]
    fn bare_date_means_end_of_working_day() {
        let hours = WorkingHours::default();
        let end = parse_datetime("2026-03-04", &hours).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap());
    }

    #[test]
    fn phase_minutes_need_four_values() {
        assert_eq!(parse_phase_minutes("20, 20,20,20").unwrap(), [20, 20, 20, 20]);
        assert!(parse_phase_minutes("20,20").is_err());
        assert!(parse_phase_minutes("a,b,c,d").is_err());
    }

    #[test]
    fn short_id_tolerates_short_and_multibyte_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("t1"), "t1");
        assert_eq!(short_id("äöüäöü"), "äöüä");
        assert_eq!(short_id("xäöüäöü"), "xäöüäöü");
    }
}
