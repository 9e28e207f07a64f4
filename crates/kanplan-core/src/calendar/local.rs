//! In-process calendar provider.
//!
//! Backs the CLI (its events are persisted as a JSON snapshot) and the test
//! suite, which uses the fault-injection and latency knobs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{BusyInterval, CalendarProvider};
use crate::error::ProviderError;
use crate::schedule::ScheduledBlock;

/// Event stored by [`LocalCalendar`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Set for events created from scheduled blocks
    #[serde(default)]
    pub task_id: Option<String>,
}

impl CalendarEvent {
    /// Check if this event overlaps with a time range
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing_days: HashSet<NaiveDate>,
    offline: bool,
}

/// Calendar held in memory.
#[derive(Debug)]
pub struct LocalCalendar {
    calendar_id: String,
    events: Mutex<Vec<CalendarEvent>>,
    faults: Mutex<Faults>,
    latency: Option<Duration>,
}

impl LocalCalendar {
    /// Empty calendar; created events land in `calendar_id`.
    pub fn new(calendar_id: impl Into<String>) -> Self {
        Self::from_events(calendar_id, Vec::new())
    }

    /// Restore from a snapshot produced by [`LocalCalendar::events`].
    pub fn from_events(calendar_id: impl Into<String>, events: Vec<CalendarEvent>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            events: Mutex::new(events),
            faults: Mutex::new(Faults::default()),
            latency: None,
        }
    }

    /// Delay every provider call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    /// Snapshot of all events, ordered by start.
    pub fn events(&self) -> Vec<CalendarEvent> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner).clone();
        events.sort_by_key(|e| e.start_time);
        events
    }

    /// Add a busy event that did not come from the planner.
    pub fn add_busy(&self, title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CalendarEvent {
                id: id.clone(),
                calendar_id: self.calendar_id.clone(),
                title: title.into(),
                start_time: start,
                end_time: end,
                task_id: None,
            });
        id
    }

    /// Move an existing event; returns false when it does not exist.
    pub fn move_event(&self, event_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match events.iter_mut().find(|e| e.id == event_id) {
            Some(event) => {
                event.start_time = start;
                event.end_time = end;
                true
            }
            None => false,
        }
    }

    /// Remove an event; returns false when it does not exist.
    pub fn remove(&self, event_id: &str) -> bool {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let before = events.len();
        events.retain(|e| e.id != event_id);
        events.len() != before
    }

    /// Make busy queries starting on `date` (UTC) fail.
    pub fn fail_on(&self, date: NaiveDate) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_days
            .insert(date);
    }

    /// Make every call fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner).offline = offline;
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_online(&self) -> Result<(), ProviderError> {
        if self.faults.lock().unwrap_or_else(PoisonError::into_inner).offline {
            return Err(ProviderError::Unavailable("local calendar is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarProvider for LocalCalendar {
    async fn list_busy_intervals(
        &self,
        calendar_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ProviderError> {
        self.simulate_latency().await;
        self.check_online()?;
        let failing = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_days
            .contains(&range_start.date_naive());
        if failing {
            return Err(ProviderError::Unavailable(format!(
                "busy query failed for {}",
                range_start.date_naive()
            )));
        }

        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events
            .iter()
            .filter(|e| e.calendar_id == calendar_id && e.overlaps(range_start, range_end))
            .map(|e| BusyInterval {
                start: e.start_time,
                end: e.end_time,
                event_id: Some(e.id.clone()),
            })
            .collect())
    }

    async fn create_event(&self, block: &ScheduledBlock, task_title: &str) -> Result<String, ProviderError> {
        self.simulate_latency().await;
        self.check_online()?;
        let id = uuid::Uuid::new_v4().to_string();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CalendarEvent {
                id: id.clone(),
                calendar_id: self.calendar_id.clone(),
                title: format!("[{}] {}", block.phase, task_title),
                start_time: block.start_time,
                end_time: block.end_time,
                task_id: Some(block.task_id.clone()),
            });
        Ok(id)
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        self.check_online()?;
        self.remove(event_id);
        Ok(())
    }

    async fn is_slot_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool, ProviderError> {
        self.simulate_latency().await;
        self.check_online()?;
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(!events
            .iter()
            .any(|e| e.calendar_id == self.calendar_id && e.overlaps(start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Phase;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn busy_query_filters_by_calendar_and_range() {
        let cal = LocalCalendar::new("primary");
        cal.add_busy("standup", at(9), at(10));
        cal.add_busy("lunch", at(12), at(13));
        let busy = cal.list_busy_intervals("primary", at(11), at(14)).await.unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].start, at(12));
        assert!(cal.list_busy_intervals("other", at(0), at(23)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_events_block_the_slot() {
        let cal = LocalCalendar::new("primary");
        let block = ScheduledBlock::new("t1", Phase::Design, at(14), at(14) + ChronoDuration::minutes(30));
        assert!(cal.is_slot_free(at(14), at(15)).await.unwrap());
        let id = cal.create_event(&block, "Plan launch").await.unwrap();
        assert!(!cal.is_slot_free(at(14), at(15)).await.unwrap());
        assert_eq!(cal.events()[0].title, "[design] Plan launch");
        cal.delete_event(&id).await.unwrap();
        assert!(cal.events().is_empty());
    }

    #[tokio::test]
    async fn injected_faults_surface_as_unavailable() {
        let cal = LocalCalendar::new("primary");
        cal.fail_on(at(9).date_naive());
        assert!(cal.list_busy_intervals("primary", at(9), at(18)).await.is_err());
        cal.set_offline(true);
        let block = ScheduledBlock::new("t1", Phase::Design, at(14), at(15));
        assert!(matches!(
            cal.create_event(&block, "x").await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
