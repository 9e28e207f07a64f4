//! Round-trip tests through the SQLite store.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use kanplan_core::events::RescheduleHistory;
use kanplan_core::{
    ActualTime, Config, Estimation, FixedClock, KeyValueStore, LocalCalendar, Phase, Planner,
    Priority, RescheduleScope, ReschedulingEvent, ScheduledBlock, SqliteStore, Task, TaskStore,
    TriggerReason,
};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, h, m, 0).unwrap()
}

#[test]
fn test_task_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open_at(&dir.path().join("db.sqlite")).unwrap());
    let tasks = TaskStore::new(Arc::clone(&store));

    let mut task = Task::new("Prepare slides")
        .with_deadline(at(17, 0))
        .with_priority(Priority::High)
        .with_project("Talks")
        .with_keywords(["deck", "conference"]);
    task.notify_at = Some(at(16, 0));
    task.estimation = Some(Estimation::from_phases([18, 27, 36, 9], 0.7));
    task.actual_time = Some(ActualTime::new(10, 20, 30, 5));
    let mut block = ScheduledBlock::new(task.id.clone(), Phase::Design, at(10, 0), at(10, 27));
    block.provider_event_id = Some("evt-7".into());
    task.set_blocks(vec![block]);
    task.push_history(ReschedulingEvent::new(TriggerReason::ManualAdjustment, at(9, 0)));

    tasks.upsert(&task).unwrap();
    let loaded = tasks.get(&task.id[..8]).unwrap();
    assert_eq!(loaded, task);
}

#[test]
fn test_event_history_round_trip() {
    let store = SqliteStore::open_memory().unwrap();
    let mut history = RescheduleHistory::new(2);
    for hour in [9, 10, 11] {
        history.push(ReschedulingEvent::new(TriggerReason::CalendarChange, at(hour, 0)));
    }
    history.persist(&store).unwrap();

    let loaded = RescheduleHistory::load(&store, 2).unwrap();
    assert_eq!(loaded.to_vec(), history.to_vec());
    assert_eq!(loaded.latest().map(|e| e.timestamp), Some(at(11, 0)));
}

#[tokio::test]
async fn test_planner_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kanplan.db");
    let calendar = Arc::new(LocalCalendar::new("primary"));
    let clock = Arc::new(FixedClock(at(10, 0)));
    let config = Config {
        buffer_minutes: 10,
        ..Config::default()
    };

    let task_id = {
        let store = Arc::new(SqliteStore::open_at(&path).unwrap());
        let planner = Planner::with_clock(config.clone(), store, calendar.clone(), clock.clone()).unwrap();
        let task = planner
            .add_task(Task::new("Write summary").with_deadline(at(13, 0)))
            .unwrap();
        planner
            .reschedule(RescheduleScope::Tasks(vec![task.id.clone()]), TriggerReason::TaskUpdate)
            .await
            .unwrap()
            .unwrap();
        task.id
    };

    let store = Arc::new(SqliteStore::open_at(&path).unwrap());
    let planner = Planner::with_clock(config, store, calendar, clock).unwrap();
    let task = planner.task(&task_id).unwrap();
    assert_eq!(task.scheduled_blocks.len(), 4);
    assert_eq!(task.provider_event_ids().len(), 4);
    assert_eq!(planner.history().len(), 1);
    assert_eq!(task.rescheduling_history, planner.history());
}
