//! Integration tests for allocation and rescheduling against a local calendar.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc, Weekday};
use kanplan_core::schedule::DayHours;
use kanplan_core::{
    AvailabilityFinder, Estimation, Estimator, FixedClock, LocalCalendar, Phase, PhaseAllocator,
    Rescheduler, ScheduleError, Task, TriggerReason, WorkingHours,
};

// 2026-03-04 is a Wednesday.
fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, h, m, 0).unwrap()
}

fn nine_to_six() -> WorkingHours {
    WorkingHours::every_day(
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    )
}

fn wednesdays_only() -> WorkingHours {
    let mut hours = nine_to_six();
    for day in [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ] {
        *hours.for_weekday_mut(day) = DayHours::disabled();
    }
    hours
}

fn allocator(calendar: Arc<LocalCalendar>, now: DateTime<Utc>) -> PhaseAllocator {
    PhaseAllocator::new(AvailabilityFinder::new(calendar, "primary")).with_clock(Arc::new(FixedClock(now)))
}

#[tokio::test]
async fn test_free_calendar_gets_four_blocks_before_deadline() {
    let calendar = Arc::new(LocalCalendar::new("primary"));
    let allocator = allocator(calendar, at(10, 0));
    let task = Task::new("Draft proposal").with_deadline(at(13, 0));
    let estimation = Estimator::new().estimate(&task);
    assert_eq!(estimation.total, 60);

    let allocation = allocator
        .allocate(&task, &estimation, &nine_to_six(), 10)
        .await
        .unwrap();
    let blocks = &allocation.blocks;

    assert_eq!(blocks.len(), 4);
    assert_eq!(allocation.total_minutes(), 60);
    assert_eq!(
        blocks.iter().map(|b| b.phase).collect::<Vec<_>>(),
        Phase::ALL.to_vec()
    );
    for pair in blocks.windows(2) {
        assert!(!pair[0].overlaps(&pair[1]));
        assert_eq!(pair[1].start_time - pair[0].end_time, Duration::minutes(10));
    }
    assert!(blocks.iter().all(|b| b.end_time <= at(13, 0)));
    assert_eq!(blocks[3].end_time, at(11, 30));
}

#[tokio::test]
async fn test_tight_deadline_is_rescued_by_extension() {
    let calendar = Arc::new(LocalCalendar::new("primary"));
    // Only 20 minutes remain before the rest of the day is booked.
    calendar.add_busy("Workshop", at(10, 20), at(18, 0));
    let hours = wednesdays_only();
    let task = Task::new("Draft proposal").with_deadline(at(13, 0));
    let estimation = Estimator::new().estimate(&task);

    let err = allocator(Arc::clone(&calendar), at(10, 0))
        .allocate(&task, &estimation, &hours, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::CapacityExceeded { .. }));

    let rescheduler = Rescheduler::new(Estimator::new(), allocator(calendar, at(10, 0)), 100);
    let mut tasks = vec![task];
    let event = rescheduler
        .reschedule_affected(&mut tasks, TriggerReason::TaskUpdate, &hours, 10)
        .await
        .unwrap()
        .unwrap();

    assert!(event.skipped.is_empty());
    let change = event.change_for(&tasks[0].id).unwrap();
    assert!(change.new_schedule.end > at(13, 0) + Duration::days(6));
    assert!(change.new_schedule.end <= at(13, 0) + Duration::days(7));
    assert_eq!(tasks[0].scheduled_blocks.len(), 4);
}

#[tokio::test]
async fn test_exhausted_ladder_keeps_previous_schedule() {
    let calendar = Arc::new(LocalCalendar::new("primary"));
    calendar.add_busy("Conference", at(9, 0), at(9, 0) + Duration::days(10));
    let rescheduler = Rescheduler::new(Estimator::new(), allocator(calendar, at(10, 0)), 100);

    let mut task = Task::new("Draft proposal").with_deadline(at(13, 0));
    let previous = vec![kanplan_core::ScheduledBlock::new(
        task.id.clone(),
        Phase::Implementation,
        at(9, 0),
        at(10, 0),
    )];
    task.set_blocks(previous.clone());
    let mut tasks = vec![task];

    let event = rescheduler
        .reschedule_affected(&mut tasks, TriggerReason::CalendarChange, &nine_to_six(), 10)
        .await
        .unwrap()
        .unwrap();
    assert!(event.changes.is_empty());
    assert_eq!(event.skipped.len(), 1);
    assert!(event.skipped[0].reason.contains("Not enough free time"));
    assert_eq!(tasks[0].scheduled_blocks, previous);
}

#[tokio::test]
async fn test_concurrent_trigger_is_dropped() {
    let calendar = Arc::new(LocalCalendar::new("primary").with_latency(StdDuration::from_millis(20)));
    let rescheduler = Rescheduler::new(Estimator::new(), allocator(calendar, at(10, 0)), 100);
    let mut first = vec![Task::new("First").with_deadline(at(13, 0))];
    let mut second = vec![Task::new("Second").with_deadline(at(13, 0))];
    let hours = nine_to_six();

    let (a, b) = tokio::join!(
        rescheduler.reschedule_affected(&mut first, TriggerReason::CalendarChange, &hours, 10),
        rescheduler.reschedule_affected(&mut second, TriggerReason::CalendarChange, &hours, 10),
    );

    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_none());
    assert_eq!(rescheduler.history().len(), 1);
    assert!(second[0].scheduled_blocks.is_empty());

    // The guard is released once the pass is over.
    let again = rescheduler
        .reschedule_affected(&mut second, TriggerReason::TaskUpdate, &hours, 10)
        .await
        .unwrap();
    assert!(again.is_some());
}

#[tokio::test]
async fn test_rescheduling_is_idempotent_around_busy_time() {
    let calendar = Arc::new(LocalCalendar::new("primary"));
    calendar.add_busy("Standup", at(10, 30), at(11, 0));
    calendar.add_busy("Lunch", at(12, 0), at(13, 0));
    let rescheduler = Rescheduler::new(Estimator::new(), allocator(calendar, at(10, 0)), 100);
    let mut tasks = vec![
        Task::new("Draft proposal").with_deadline(at(17, 0)),
        Task::new("Review budget").with_deadline(at(16, 0)),
    ];

    let first = rescheduler
        .reschedule_affected(&mut tasks, TriggerReason::TaskUpdate, &nine_to_six(), 15)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.changes.len(), 2);

    let second = rescheduler
        .reschedule_affected(&mut tasks, TriggerReason::ManualAdjustment, &nine_to_six(), 15)
        .await
        .unwrap()
        .unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(tasks[0].rescheduling_history.len(), 2);
}

#[tokio::test]
async fn test_failed_day_is_assumed_free() {
    let calendar = Arc::new(LocalCalendar::new("primary"));
    calendar.add_busy("All hands", at(9, 0), at(18, 0));
    calendar.fail_on(at(0, 0).date_naive());
    let task = Task::new("Draft proposal").with_deadline(at(17, 0));
    let estimation = Estimation::from_phases([12, 18, 24, 6], 0.7);

    let allocation = allocator(calendar, at(10, 0))
        .allocate(&task, &estimation, &nine_to_six(), 10)
        .await
        .unwrap();
    assert_eq!(allocation.degraded_days, vec![at(0, 0).date_naive()]);
    assert_eq!(allocation.blocks[0].start_time, at(10, 0));
}
