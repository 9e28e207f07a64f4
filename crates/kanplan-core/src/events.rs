//! Rescheduling events and external change notifications.
//!
//! A [`ReschedulingEvent`] is produced once per rescheduling pass and is
//! immutable after it is recorded.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::schedule::ScheduleWindow;
use crate::storage::{self, KeyValueStore};
use crate::error::StorageError;

/// Store key of the global rescheduling history.
pub const HISTORY_KEY: &str = "rescheduling/history";

/// Why a rescheduling pass ran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    CalendarChange,
    TaskUpdate,
    ManualAdjustment,
}

/// Old vs new placement of one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleChange {
    pub task_id: String,
    pub old_schedule: Option<ScheduleWindow>,
    pub new_schedule: ScheduleWindow,
}

/// A task the pass could not place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedTask {
    pub task_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReschedulingEvent {
    pub id: String,
    pub reason: TriggerReason,
    pub affected_task_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<ScheduleChange>,
    #[serde(default)]
    pub skipped: Vec<SkippedTask>,
    /// Days assumed free during the pass because the calendar was unreachable
    #[serde(default)]
    pub degraded_days: Vec<NaiveDate>,
}

impl ReschedulingEvent {
    pub fn new(reason: TriggerReason, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reason,
            affected_task_ids: Vec::new(),
            timestamp,
            changes: Vec::new(),
            skipped: Vec::new(),
            degraded_days: Vec::new(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_days.is_empty()
    }

    pub fn change_for(&self, task_id: &str) -> Option<&ScheduleChange> {
        self.changes.iter().find(|c| c.task_id == task_id)
    }
}

/// Kind of change reported by the calendar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Notification delivered by a webhook or poller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalChange {
    pub change_kind: ChangeKind,
    pub external_event_id: String,
    pub calendar_id: String,
}

/// Capped, oldest-first log of rescheduling events.
#[derive(Debug, Clone)]
pub struct RescheduleHistory {
    events: VecDeque<ReschedulingEvent>,
    limit: usize,
}

impl RescheduleHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            events: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Restore a persisted history, keeping the most recent `limit` events.
    pub fn load(store: &dyn KeyValueStore, limit: usize) -> Result<Self, StorageError> {
        let mut history = Self::new(limit);
        let stored: Vec<ReschedulingEvent> = storage::load_json(store, HISTORY_KEY)?.unwrap_or_default();
        for event in stored {
            history.push(event);
        }
        Ok(history)
    }

    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        storage::save_json(store, HISTORY_KEY, &self.events)
    }

    pub fn push(&mut self, event: ReschedulingEvent) {
        self.events.push_back(event);
        while self.events.len() > self.limit {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&ReschedulingEvent> {
        self.events.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReschedulingEvent> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<ReschedulingEvent> {
        self.events.iter().cloned().collect()
    }
}
