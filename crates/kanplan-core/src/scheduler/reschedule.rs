//! Rescheduler: re-estimates and re-allocates tasks after a trigger.
//!
//! Only one pass runs at a time. A trigger that arrives while a pass is in
//! progress is dropped and reported as `Ok(None)`.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::{Allocation, PhaseAllocator, RelaxationPolicy, RelaxationStep};
use crate::calendar::BusyInterval;
use crate::error::{CoreError, ScheduleError};
use crate::estimate::Estimator;
use crate::events::{
    ExternalChange, RescheduleHistory, ReschedulingEvent, ScheduleChange, SkippedTask, TriggerReason,
};
use crate::schedule::{Estimation, ScheduleWindow, ScheduledBlock, WorkingHours};
use crate::storage::KeyValueStore;
use crate::task::Task;

/// Callback notified after every completed pass.
pub type RescheduleListener =
    Box<dyn Fn(&ReschedulingEvent) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

/// State of the most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleState {
    #[default]
    Idle,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for RescheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RescheduleState::Idle => "idle",
            RescheduleState::InProgress => "in_progress",
            RescheduleState::Completed => "completed",
            RescheduleState::Failed => "failed",
        })
    }
}

/// Releases the single-flight flag when the pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Placement {
    allocation: Allocation,
    estimation: Estimation,
    step: Option<RelaxationStep>,
}

pub struct Rescheduler {
    estimator: Estimator,
    allocator: PhaseAllocator,
    policy: RelaxationPolicy,
    history: Mutex<RescheduleHistory>,
    store: Option<Arc<dyn KeyValueStore>>,
    listeners: RwLock<Vec<RescheduleListener>>,
    in_flight: AtomicBool,
    state: Mutex<RescheduleState>,
}

impl Rescheduler {
    pub fn new(estimator: Estimator, allocator: PhaseAllocator, history_limit: usize) -> Self {
        Self {
            estimator,
            allocator,
            policy: RelaxationPolicy::default(),
            history: Mutex::new(RescheduleHistory::new(history_limit)),
            store: None,
            listeners: RwLock::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(RescheduleState::Idle),
        }
    }

    pub fn with_policy(mut self, policy: RelaxationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist the event history to `store`, starting from what it holds.
    pub fn with_store(
        mut self,
        store: Arc<dyn KeyValueStore>,
        history_limit: usize,
    ) -> Result<Self, CoreError> {
        let history = RescheduleHistory::load(store.as_ref(), history_limit)?;
        self.history = Mutex::new(history);
        self.store = Some(store);
        Ok(self)
    }

    pub fn add_listener(&self, listener: RescheduleListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn state(&self) -> RescheduleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Recorded events, oldest first.
    pub fn history(&self) -> Vec<ReschedulingEvent> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    fn set_state(&self, state: RescheduleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Re-estimate and re-allocate every task in `tasks`.
    ///
    /// Tasks are placed in order; blocks held by earlier tasks of the pass
    /// count as busy for later ones. Tasks that cannot be placed keep their
    /// previous blocks and are listed in [`ReschedulingEvent::skipped`].
    /// Returns `Ok(None)` when another pass is already running.
    pub async fn reschedule_affected(
        &self,
        tasks: &mut [Task],
        reason: TriggerReason,
        working_hours: &WorkingHours,
        buffer_minutes: u32,
    ) -> Result<Option<ReschedulingEvent>, CoreError> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!(?reason, "rescheduling already in progress; trigger dropped");
            return Ok(None);
        };
        self.set_state(RescheduleState::InProgress);

        let now = self.allocator.now();
        let mut event = ReschedulingEvent::new(reason, now);
        let mut updated = Vec::new();
        let mut claimed: Vec<BusyInterval> = Vec::new();

        for (index, task) in tasks.iter_mut().enumerate() {
            event.affected_task_ids.push(task.id.clone());

            if !task.status.is_schedulable() {
                event.skipped.push(SkippedTask {
                    task_id: task.id.clone(),
                    reason: format!("status is {}", task.status),
                });
                continue;
            }

            let old_schedule = task
                .schedule_window
                .or_else(|| ScheduleWindow::of(&task.scheduled_blocks));
            let estimation = self.estimator.estimate(task);

            let placement = match self
                .place_with_relaxation(task, estimation, working_hours, buffer_minutes, &claimed)
                .await
            {
                Ok(placement) => placement,
                Err(error) => {
                    tracing::warn!(task_id = %task.id, error = %error, "task left on its previous schedule");
                    event.skipped.push(SkippedTask {
                        task_id: task.id.clone(),
                        reason: error.to_string(),
                    });
                    claimed.extend(task.scheduled_blocks.iter().map(BusyInterval::from));
                    continue;
                }
            };

            if let Some(step) = placement.step {
                tracing::info!(task_id = %task.id, %step, "placed after relaxing constraints");
            }
            for day in placement.allocation.degraded_days {
                if !event.degraded_days.contains(&day) {
                    event.degraded_days.push(day);
                }
            }
            if !same_placement(&task.scheduled_blocks, &placement.allocation.blocks) {
                task.set_blocks(placement.allocation.blocks);
            }
            claimed.extend(task.scheduled_blocks.iter().map(BusyInterval::from));
            if let Some(new_schedule) = task.schedule_window {
                if old_schedule != Some(new_schedule) {
                    event.changes.push(ScheduleChange {
                        task_id: task.id.clone(),
                        old_schedule,
                        new_schedule,
                    });
                }
            }
            task.estimation = Some(placement.estimation);
            task.last_rescheduled_at = Some(now);
            updated.push(index);
        }

        event.degraded_days.sort();
        for index in updated {
            tasks[index].push_history(event.clone());
        }

        if let Err(error) = self.record(event.clone()) {
            self.set_state(RescheduleState::Failed);
            tracing::warn!(error = %error, "failed to persist rescheduling event");
            return Err(error);
        }
        self.set_state(RescheduleState::Completed);

        tracing::info!(
            event_id = %event.id,
            ?reason,
            affected = event.affected_task_ids.len(),
            changes = event.changes.len(),
            skipped = event.skipped.len(),
            "rescheduling pass completed"
        );
        if event.is_degraded() {
            tracing::warn!(
                event_id = %event.id,
                days = ?event.degraded_days,
                "pass placed work on days the calendar could not confirm"
            );
        }
        self.notify(&event);
        Ok(Some(event))
    }

    /// Reschedule the tasks whose blocks were mirrored as the changed event.
    pub async fn handle_external_change(
        &self,
        change: &ExternalChange,
        tasks: &mut [Task],
        working_hours: &WorkingHours,
        buffer_minutes: u32,
    ) -> Result<Option<ReschedulingEvent>, CoreError> {
        let indices: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.references_event(&change.external_event_id))
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            tracing::debug!(event_id = %change.external_event_id, "external change touches no task");
            return Ok(None);
        }

        let mut affected: Vec<Task> = indices.iter().map(|&i| tasks[i].clone()).collect();
        let event = self
            .reschedule_affected(
                &mut affected,
                TriggerReason::CalendarChange,
                working_hours,
                buffer_minutes,
            )
            .await?;
        if event.is_some() {
            for (index, task) in indices.into_iter().zip(affected) {
                tasks[index] = task;
            }
        }
        Ok(event)
    }

    async fn place_with_relaxation(
        &self,
        task: &Task,
        estimation: Estimation,
        working_hours: &WorkingHours,
        buffer_minutes: u32,
        claimed: &[BusyInterval],
    ) -> Result<Placement, ScheduleError> {
        estimation.validate()?;
        let deadline = task.deadline.ok_or_else(|| ScheduleError::MissingDeadline {
            task_id: task.id.clone(),
        })?;
        let own_events: HashSet<String> = task.provider_event_ids().into_iter().collect();

        let mut last_error = match self
            .allocator
            .allocate_until(
                &task.id,
                &estimation,
                working_hours,
                buffer_minutes,
                deadline,
                &own_events,
                claimed,
            )
            .await
        {
            Ok(allocation) => {
                return Ok(Placement {
                    allocation,
                    estimation,
                    step: None,
                })
            }
            Err(error) if error.is_relaxable() => error,
            Err(error) => return Err(error),
        };

        for attempt in self.policy.ladder(deadline, buffer_minutes, &estimation) {
            tracing::debug!(task_id = %task.id, step = %attempt.step, "retrying with relaxed constraints");
            match self
                .allocator
                .allocate_until(
                    &task.id,
                    &attempt.estimation,
                    working_hours,
                    attempt.buffer_minutes,
                    attempt.deadline,
                    &own_events,
                    claimed,
                )
                .await
            {
                Ok(allocation) => {
                    return Ok(Placement {
                        allocation,
                        estimation: attempt.estimation,
                        step: Some(attempt.step),
                    })
                }
                Err(error) if error.is_relaxable() => last_error = error,
                Err(error) => return Err(error),
            }
        }
        Err(last_error)
    }

    fn record(&self, event: ReschedulingEvent) -> Result<(), CoreError> {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(event);
        if let Some(store) = &self.store {
            history.persist(store.as_ref())?;
        }
        Ok(())
    }

    fn notify(&self, event: &ReschedulingEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for (position, listener) in listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(listener = position, error = %error, "rescheduling listener failed")
                }
                Err(_) => tracing::warn!(listener = position, "rescheduling listener panicked"),
            }
        }
    }
}

/// Same phases at the same instants, ignoring block and event ids.
fn same_placement(current: &[ScheduledBlock], fresh: &[ScheduledBlock]) -> bool {
    current.len() == fresh.len()
        && current.iter().zip(fresh).all(|(a, b)| {
            a.phase == b.phase && a.start_time == b.start_time && a.end_time == b.end_time
        })
}
