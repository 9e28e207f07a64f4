//! Phase allocator.
//!
//! Places a task's four phases into free time before its deadline:
//! - Walks free slots earliest first
//! - Fills each slot with the remaining phase work, in phase order
//! - Leaves `buffer_minutes` after every placed block
//! - Stops using a slot once less than the minimum block size remains

pub mod relax;
pub mod reschedule;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::calendar::BusyInterval;
use crate::clock::{Clock, SystemClock};
use crate::error::ScheduleError;
use crate::schedule::{Estimation, Phase, ScheduledBlock, TimeSlot, WorkingHours};
use crate::task::Task;
use crate::timeline::{AvailabilityFinder, MIN_SLOT_MINUTES};

pub use relax::{RelaxationPolicy, RelaxationStep, RelaxedAttempt};
pub use reschedule::{RescheduleListener, RescheduleState, Rescheduler};

/// Blocks placed for one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    /// Chronological, phase ordered
    pub blocks: Vec<ScheduledBlock>,
    /// Days assumed free because the provider could not be queried
    pub degraded_days: Vec<NaiveDate>,
}

impl Allocation {
    pub fn total_minutes(&self) -> i64 {
        self.blocks.iter().map(|b| b.duration_minutes()).sum()
    }
}

/// Greedy earliest-first placement of phase blocks.
#[derive(Clone)]
pub struct PhaseAllocator {
    finder: AvailabilityFinder,
    clock: Arc<dyn Clock>,
}

impl PhaseAllocator {
    pub fn new(finder: AvailabilityFinder) -> Self {
        Self {
            finder,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn finder(&self) -> &AvailabilityFinder {
        &self.finder
    }

    /// Allocate `estimation` for `task` between now and the task's deadline.
    pub async fn allocate(
        &self,
        task: &Task,
        estimation: &Estimation,
        working_hours: &WorkingHours,
        buffer_minutes: u32,
    ) -> Result<Allocation, ScheduleError> {
        estimation.validate()?;
        let deadline = task.deadline.ok_or_else(|| ScheduleError::MissingDeadline {
            task_id: task.id.clone(),
        })?;
        self.allocate_until(
            &task.id,
            estimation,
            working_hours,
            buffer_minutes,
            deadline,
            &HashSet::new(),
            &[],
        )
        .await
    }

    /// Allocate against an explicit deadline, ignoring busy time that belongs
    /// to `ignored_event_ids` and avoiding the `claimed` intervals.
    pub async fn allocate_until(
        &self,
        task_id: &str,
        estimation: &Estimation,
        working_hours: &WorkingHours,
        buffer_minutes: u32,
        deadline: DateTime<Utc>,
        ignored_event_ids: &HashSet<String>,
        claimed: &[BusyInterval],
    ) -> Result<Allocation, ScheduleError> {
        estimation.validate()?;
        let now = self.clock.now();
        let free = self
            .finder
            .find_free_slots_ignoring(
                now,
                deadline,
                working_hours,
                buffer_minutes,
                ignored_event_ids,
                claimed,
            )
            .await;

        tracing::debug!(
            task_id,
            slots = free.slots.len(),
            free_minutes = free.total_minutes(),
            required_minutes = estimation.total,
            "allocating phases"
        );

        let blocks = place_phases(task_id, estimation, &free.slots, buffer_minutes)?;
        Ok(Allocation {
            blocks,
            degraded_days: free.degraded_days,
        })
    }
}

/// Fill `slots` with the phases of `estimation`, in order.
pub fn place_phases(
    task_id: &str,
    estimation: &Estimation,
    slots: &[TimeSlot],
    buffer_minutes: u32,
) -> Result<Vec<ScheduledBlock>, ScheduleError> {
    let mut work: VecDeque<(Phase, i64)> = Phase::ALL
        .iter()
        .map(|&phase| (phase, i64::from(estimation.minutes(phase))))
        .filter(|(_, minutes)| *minutes > 0)
        .collect();
    let buffer = i64::from(buffer_minutes);
    let mut blocks = Vec::new();

    for slot in slots {
        if work.is_empty() {
            break;
        }
        let mut cursor = slot.start;
        let mut remaining = slot.duration_minutes;

        while remaining >= MIN_SLOT_MINUTES {
            let Some((phase, left)) = work.front_mut() else {
                break;
            };
            let take = remaining.min(*left);
            let end = cursor + Duration::minutes(take);
            blocks.push(ScheduledBlock::new(task_id, *phase, cursor, end));

            cursor = end + Duration::minutes(buffer);
            remaining -= take + buffer;
            *left -= take;
            if *left == 0 {
                work.pop_front();
            }
        }
    }

    if !work.is_empty() {
        let available_minutes = slots.iter().map(|s| s.duration_minutes).sum();
        let unplaced: i64 = work.iter().map(|(_, m)| m).sum();
        tracing::debug!(task_id, unplaced, available_minutes, "free time exhausted");
        return Err(ScheduleError::CapacityExceeded {
            task_id: task_id.to_string(),
            required_minutes: i64::from(estimation.total),
            available_minutes,
        });
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::LocalCalendar;
    use crate::clock::FixedClock;
    use chrono::{NaiveTime, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, h, m, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn allocator(calendar: Arc<LocalCalendar>, now: DateTime<Utc>) -> PhaseAllocator {
        PhaseAllocator::new(AvailabilityFinder::new(calendar, "primary"))
            .with_clock(Arc::new(FixedClock(now)))
    }

    #[test]
    fn places_phases_in_order_with_buffers() {
        let est = Estimation::from_phases([12, 18, 24, 6], 0.7);
        let slots = vec![TimeSlot::new(at(10, 0), at(13, 0))];
        let blocks = place_phases("t1", &est, &slots, 10).unwrap();

        let spans: Vec<_> = blocks
            .iter()
            .map(|b| (b.phase, b.start_time, b.end_time))
            .collect();
        assert_eq!(
            spans,
            vec![
                (Phase::Incubation, at(10, 0), at(10, 12)),
                (Phase::Design, at(10, 22), at(10, 40)),
                (Phase::Implementation, at(10, 50), at(11, 14)),
                (Phase::Improvement, at(11, 24), at(11, 30)),
            ]
        );
    }

    #[test]
    fn phase_split_across_slots() {
        let est = Estimation::from_phases([0, 0, 90, 0], 0.7);
        let slots = vec![
            TimeSlot::new(at(9, 0), at(10, 0)),
            TimeSlot::new(at(11, 0), at(12, 0)),
        ];
        let blocks = place_phases("t1", &est, &slots, 0).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.phase == Phase::Implementation));
        assert_eq!(blocks[0].duration_minutes(), 60);
        assert_eq!(blocks[1].duration_minutes(), 30);
        assert!(!blocks[0].overlaps(&blocks[1]));
    }

    #[test]
    fn small_remainder_of_slot_is_abandoned() {
        // After 40 + 10 buffer only 25 minutes remain in the first slot.
        let est = Estimation::from_phases([40, 20, 0, 0], 0.7);
        let slots = vec![
            TimeSlot::new(at(9, 0), at(10, 15)),
            TimeSlot::new(at(11, 0), at(12, 0)),
        ];
        let blocks = place_phases("t1", &est, &slots, 10).unwrap();
        assert_eq!(blocks[1].phase, Phase::Design);
        assert_eq!(blocks[1].start_time, at(11, 0));
    }

    #[test]
    fn capacity_exceeded_reports_minutes() {
        let est = Estimation::from_phases([12, 18, 24, 6], 0.7);
        let slots = vec![TimeSlot::new(at(9, 0), at(9, 30))];
        let err = place_phases("t1", &est, &slots, 15).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::CapacityExceeded {
                task_id: "t1".into(),
                required_minutes: 60,
                available_minutes: 30,
            }
        );
    }

    #[tokio::test]
    async fn allocate_before_deadline_on_free_calendar() {
        let calendar = Arc::new(LocalCalendar::new("primary"));
        let task = Task::new("Draft report").with_deadline(at(13, 0));
        let est = Estimation::from_phases([12, 18, 24, 6], 0.7);
        let hours = WorkingHours::every_day(hm(9, 0), hm(18, 0));

        let allocation = allocator(calendar, at(10, 0))
            .allocate(&task, &est, &hours, 10)
            .await
            .unwrap();
        assert_eq!(allocation.blocks.len(), 4);
        assert_eq!(allocation.total_minutes(), 60);
        assert!(allocation.blocks.iter().all(|b| b.end_time <= at(13, 0)));
        assert!(allocation.degraded_days.is_empty());
    }

    #[tokio::test]
    async fn allocate_requires_deadline() {
        let calendar = Arc::new(LocalCalendar::new("primary"));
        let task = Task::new("Someday");
        let est = Estimation::from_phases([12, 18, 24, 6], 0.7);
        let err = allocator(calendar, at(10, 0))
            .allocate(&task, &est, &WorkingHours::default(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::MissingDeadline { .. }));
    }

    #[tokio::test]
    async fn allocate_rejects_invalid_estimation_first() {
        let calendar = Arc::new(LocalCalendar::new("primary"));
        let task = Task::new("Someday");
        let mut est = Estimation::from_phases([12, 18, 24, 6], 0.7);
        est.total = 10;
        let err = allocator(calendar, at(10, 0))
            .allocate(&task, &est, &WorkingHours::default(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidEstimation { .. }));
    }

    #[tokio::test]
    async fn allocation_avoids_busy_time() {
        let calendar = Arc::new(LocalCalendar::new("primary"));
        calendar.add_busy("Standup", at(10, 0), at(11, 0));
        let task = Task::new("Review").with_deadline(at(14, 0));
        let est = Estimation::from_phases([0, 0, 30, 0], 0.7);
        let hours = WorkingHours::every_day(hm(9, 0), hm(18, 0));

        let allocation = allocator(calendar, at(10, 0))
            .allocate(&task, &est, &hours, 0)
            .await
            .unwrap();
        assert_eq!(allocation.blocks[0].start_time, at(11, 0));
    }
}
