//! Schedule types: phases, estimations, scheduled blocks and free slots.

pub mod working_hours;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ScheduleError;

pub use working_hours::{DayHours, WorkingHours};

/// Work stage a task is decomposed into.
///
/// Declaration order is the scheduling order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Incubation,
    Design,
    Implementation,
    Improvement,
}

impl Phase {
    /// All phases in scheduling order.
    pub const ALL: [Phase; 4] = [
        Phase::Incubation,
        Phase::Design,
        Phase::Implementation,
        Phase::Improvement,
    ];

    /// Position in the fixed phase sequence.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Incubation => "incubation",
            Phase::Design => "design",
            Phase::Implementation => "implementation",
            Phase::Improvement => "improvement",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase minute breakdown for a task.
///
/// `total` always equals the sum of the four phases; use [`Estimation::validate`]
/// on values that did not come from the estimator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Estimation {
    pub incubation: u32,
    pub design: u32,
    pub implementation: u32,
    pub improvement: u32,
    pub total: u32,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl Estimation {
    /// Build from phase minutes; the total is derived.
    pub fn from_phases(minutes: [u32; 4], confidence: f64) -> Self {
        Self {
            incubation: minutes[0],
            design: minutes[1],
            implementation: minutes[2],
            improvement: minutes[3],
            total: minutes.iter().sum(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn minutes(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Incubation => self.incubation,
            Phase::Design => self.design,
            Phase::Implementation => self.implementation,
            Phase::Improvement => self.improvement,
        }
    }

    /// Phase minutes in scheduling order.
    pub fn phase_minutes(&self) -> [u32; 4] {
        [self.incubation, self.design, self.implementation, self.improvement]
    }

    /// Reject estimations whose phases do not sum to the total.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let phase_sum: u32 = self.phase_minutes().iter().sum();
        if phase_sum != self.total {
            return Err(ScheduleError::InvalidEstimation {
                phase_sum,
                total: self.total,
            });
        }
        Ok(())
    }

    /// Shrink every phase by `fraction` (0.3 = 30% shorter), flooring each.
    pub fn shrunk_by(&self, fraction: f64) -> Self {
        let keep = (1.0 - fraction).clamp(0.0, 1.0);
        let minutes = self
            .phase_minutes()
            .map(|m| (f64::from(m) * keep).floor() as u32);
        Self::from_phases(minutes, self.confidence)
    }
}

/// Observed minutes per phase for a completed task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ActualTime {
    pub incubation: u32,
    pub design: u32,
    pub implementation: u32,
    pub improvement: u32,
}

impl ActualTime {
    pub fn new(incubation: u32, design: u32, implementation: u32, improvement: u32) -> Self {
        Self {
            incubation,
            design,
            implementation,
            improvement,
        }
    }

    pub fn phase_minutes(&self) -> [u32; 4] {
        [self.incubation, self.design, self.implementation, self.improvement]
    }

    pub fn total(&self) -> u32 {
        self.phase_minutes().iter().sum()
    }
}

/// A phase-tagged interval committed for a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledBlock {
    pub id: String,
    pub task_id: String,
    pub phase: Phase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Event id assigned by the calendar provider once mirrored
    #[serde(default)]
    pub provider_event_id: Option<String>,
}

impl ScheduledBlock {
    /// Create a new, not yet mirrored block
    pub fn new(
        task_id: impl Into<String>,
        phase: Phase,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            phase,
            start_time,
            end_time,
            provider_event_id: None,
        }
    }

    /// Get total duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn overlaps(&self, other: &ScheduledBlock) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// Earliest start and latest end of a task's blocks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleWindow {
    /// Window spanning `blocks`, or `None` when there are none.
    pub fn of(blocks: &[ScheduledBlock]) -> Option<Self> {
        let start = blocks.iter().map(|b| b.start_time).min()?;
        let end = blocks.iter().map(|b| b.end_time).max()?;
        Some(Self { start, end })
    }
}

/// A contiguous free interval inside working hours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
        }
    }
}
