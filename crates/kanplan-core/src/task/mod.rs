//! Task entries and their kanban status.
//!
//! Tasks are created by the user and mutated by status changes, scheduling and
//! rescheduling. The scheduling subsystem never deletes a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::events::ReschedulingEvent;
use crate::schedule::{ActualTime, Estimation, ScheduleWindow, ScheduledBlock};

/// Per-task cap on retained rescheduling events.
pub const TASK_HISTORY_LIMIT: usize = 100;

/// Kanban column of a task.
///
/// Valid transitions:
/// - TODO, DOING and NOTE may move to any status
/// - DONE only reopens to TODO; DONE → NOTE is rejected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Done,
    /// Reference entry, never scheduled
    Note,
}

impl TaskStatus {
    /// Check if a transition is valid.
    pub fn can_transition_to(&self, to: &TaskStatus) -> bool {
        match self {
            TaskStatus::Todo | TaskStatus::Doing | TaskStatus::Note => true,
            TaskStatus::Done => matches!(to, TaskStatus::Todo | TaskStatus::Done),
        }
    }

    /// Whether tasks in this status take part in scheduling.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::Doing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
            TaskStatus::Note => "note",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            "note" => Ok(TaskStatus::Note),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::str::FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(ValidationError::InvalidValue {
                field: "priority".into(),
                message: format!("unknown priority '{other}'"),
            }),
        }
    }
}

/// A short task entry, optionally scheduled against a deadline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Task title
    pub title: String,
    pub status: TaskStatus,
    /// Declared project, first choice for the learning category
    #[serde(default)]
    pub project: Option<String>,
    /// Free-form keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    /// Reminder instant, independent of the deadline
    #[serde(default)]
    pub notify_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub estimation: Option<Estimation>,
    #[serde(default)]
    pub actual_time: Option<ActualTime>,
    #[serde(default)]
    pub scheduled_blocks: Vec<ScheduledBlock>,
    #[serde(default)]
    pub schedule_window: Option<ScheduleWindow>,
    #[serde(default)]
    pub last_rescheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rescheduling_history: Vec<ReschedulingEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new `todo` task.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            status: TaskStatus::Todo,
            project: None,
            keywords: Vec::new(),
            deadline: None,
            notify_at: None,
            priority: Priority::Normal,
            estimation: None,
            actual_time: None,
            scheduled_blocks: Vec::new(),
            schedule_window: None,
            last_rescheduled_at: None,
            rescheduling_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Move to another status.
    pub fn transition_to(&mut self, to: TaskStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(&to) {
            return Err(ValidationError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the scheduled blocks and recompute the schedule window.
    pub fn set_blocks(&mut self, blocks: Vec<ScheduledBlock>) {
        self.schedule_window = ScheduleWindow::of(&blocks);
        self.scheduled_blocks = blocks;
        self.updated_at = Utc::now();
    }

    /// Whether any block was mirrored as the given provider event.
    pub fn references_event(&self, provider_event_id: &str) -> bool {
        self.scheduled_blocks
            .iter()
            .any(|b| b.provider_event_id.as_deref() == Some(provider_event_id))
    }

    /// Provider event ids of the mirrored blocks.
    pub fn provider_event_ids(&self) -> Vec<String> {
        self.scheduled_blocks
            .iter()
            .filter_map(|b| b.provider_event_id.clone())
            .collect()
    }

    /// Append to the per-task rescheduling history, dropping the oldest entries.
    pub fn push_history(&mut self, event: ReschedulingEvent) {
        self.rescheduling_history.push(event);
        if self.rescheduling_history.len() > TASK_HISTORY_LIMIT {
            let excess = self.rescheduling_history.len() - TASK_HISTORY_LIMIT;
            self.rescheduling_history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Phase;
    use chrono::{Duration, TimeZone};

    #[test]
    fn done_only_reopens_to_todo() {
        let mut task = Task::new("write report");
        task.transition_to(TaskStatus::Doing).unwrap();
        task.transition_to(TaskStatus::Done).unwrap();
        assert!(task.transition_to(TaskStatus::Doing).is_err());
        assert!(task.transition_to(TaskStatus::Note).is_err());
        task.transition_to(TaskStatus::Todo).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
    }

    #[test]
    fn notes_can_be_closed_directly() {
        let mut task = Task::new("idea");
        task.transition_to(TaskStatus::Note).unwrap();
        task.transition_to(TaskStatus::Done).unwrap();
        assert!(!TaskStatus::Done.can_transition_to(&TaskStatus::Note));
    }

    #[test]
    fn notes_are_not_schedulable() {
        assert!(TaskStatus::Todo.is_schedulable());
        assert!(TaskStatus::Doing.is_schedulable());
        assert!(!TaskStatus::Note.is_schedulable());
        assert!(!TaskStatus::Done.is_schedulable());
    }

    #[test]
    fn set_blocks_updates_window() {
        let mut task = Task::new("t");
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut block = ScheduledBlock::new(&task.id, Phase::Incubation, start, start + Duration::minutes(30));
        block.provider_event_id = Some("evt-1".into());
        task.set_blocks(vec![block]);
        assert_eq!(task.schedule_window.unwrap().end, start + Duration::minutes(30));
        assert!(task.references_event("evt-1"));
        assert!(!task.references_event("evt-2"));
    }

    #[test]
    fn parses_status_and_priority() {
        assert_eq!("Doing".parse::<TaskStatus>().unwrap(), TaskStatus::Doing);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn task_serialization_round_trip() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 6, 17, 0, 0).unwrap();
        let task = Task::new("Design API")
            .with_deadline(deadline)
            .with_project("backend")
            .with_keywords(["api"])
            .with_priority(Priority::High);
        let json = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, task);
    }
}
