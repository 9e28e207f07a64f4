//! Availability finder: free slots within working hours up to a deadline.
//!
//! Days are queried one at a time, in order. A failed provider query makes
//! that day's whole working window count as free; the day is reported in
//! [`FreeSlots::degraded_days`] and logged at warn level.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use super::{GapFinder, MIN_SLOT_MINUTES};
use crate::calendar::{BusyInterval, CalendarProvider};
use crate::schedule::{TimeSlot, WorkingHours};

/// Result of an availability search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeSlots {
    /// Chronologically ascending
    pub slots: Vec<TimeSlot>,
    /// Days whose busy query failed and were assumed free
    pub degraded_days: Vec<NaiveDate>,
}

impl FreeSlots {
    pub fn total_minutes(&self) -> i64 {
        self.slots.iter().map(|s| s.duration_minutes).sum()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_days.is_empty()
    }
}

/// Computes free slots from provider busy time.
#[derive(Clone)]
pub struct AvailabilityFinder {
    provider: Arc<dyn CalendarProvider>,
    calendar_id: String,
}

impl AvailabilityFinder {
    pub fn new(provider: Arc<dyn CalendarProvider>, calendar_id: impl Into<String>) -> Self {
        Self {
            provider,
            calendar_id: calendar_id.into(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn CalendarProvider> {
        &self.provider
    }

    /// Free slots in `[range_start, range_end]` within `working_hours`.
    pub async fn find_free_slots(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        working_hours: &WorkingHours,
        buffer_minutes: u32,
    ) -> FreeSlots {
        self.find_free_slots_ignoring(
            range_start,
            range_end,
            working_hours,
            buffer_minutes,
            &HashSet::new(),
            &[],
        )
        .await
    }

    /// Like [`find_free_slots`](Self::find_free_slots), disregarding busy
    /// intervals backed by the provider events in `ignored_event_ids` and
    /// treating `claimed` as busy on top of what the provider reports.
    ///
    /// `claimed` still applies on days whose provider query failed.
    pub async fn find_free_slots_ignoring(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        working_hours: &WorkingHours,
        buffer_minutes: u32,
        ignored_event_ids: &HashSet<String>,
        claimed: &[BusyInterval],
    ) -> FreeSlots {
        let mut result = FreeSlots::default();
        if range_end <= range_start {
            return result;
        }

        let finder = GapFinder::new()
            .with_min_gap(MIN_SLOT_MINUTES)
            .with_buffer(i64::from(buffer_minutes));
        let last_day = working_hours.local_date(range_end);
        let mut day = working_hours.local_date(range_start);

        while day <= last_day {
            if let Some((window_start, window_end)) = working_hours.window_on(day) {
                let start = window_start.max(range_start);
                let end = window_end.min(range_end);
                if start < end {
                    match self
                        .provider
                        .list_busy_intervals(&self.calendar_id, start, end)
                        .await
                    {
                        Ok(mut busy) => {
                            busy.retain(|b| {
                                b.event_id
                                    .as_ref()
                                    .map_or(true, |id| !ignored_event_ids.contains(id))
                            });
                            busy.extend(claimed.iter().filter(|c| c.overlaps(start, end)).cloned());
                            result.slots.extend(finder.find_gaps(&busy, start, end));
                        }
                        Err(error) => {
                            tracing::warn!(
                                day = %day,
                                error = %error,
                                "busy query failed; treating working window as free"
                            );
                            result.degraded_days.push(day);
                            result.slots.extend(finder.find_gaps(claimed, start, end));
                        }
                    }
                }
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        tracing::debug!(
            slots = result.slots.len(),
            free_minutes = result.total_minutes(),
            degraded = result.degraded_days.len(),
            "availability computed"
        );
        result
    }
}
