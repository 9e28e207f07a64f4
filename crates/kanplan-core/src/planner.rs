//! Planner: the composing service used by front ends.
//!
//! Owns the task store, learning store, rescheduler and calendar mirror, and
//! keeps the calendar in step with every placement it persists.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;

use crate::calendar::{BusyInterval, CalendarMirror, CalendarProvider, MirrorFailure, MirrorReport};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, ScheduleError, ValidationError};
use crate::estimate::Estimator;
use crate::events::{ExternalChange, ReschedulingEvent, TriggerReason};
use crate::learning::{LearningInsights, LearningRecord, LearningStore};
use crate::schedule::{ActualTime, Estimation};
use crate::scheduler::{PhaseAllocator, Rescheduler};
use crate::storage::{resolve_index, Config, KeyValueStore, TaskStore};
use crate::task::{Task, TaskStatus};
use crate::timeline::AvailabilityFinder;

/// Result of scheduling one task.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub task: Task,
    pub degraded_days: Vec<NaiveDate>,
    pub mirror: MirrorReport,
}

/// Result of a rescheduling pass run through the planner.
#[derive(Debug, Clone)]
pub struct RescheduleOutcome {
    pub event: ReschedulingEvent,
    /// Calendar mirroring result per rescheduled task id
    pub mirror: Vec<(String, MirrorReport)>,
}

impl RescheduleOutcome {
    pub fn is_fully_mirrored(&self) -> bool {
        self.mirror.iter().all(|(_, report)| report.is_complete())
    }

    pub fn mirror_failures(&self) -> impl Iterator<Item = (&str, &MirrorFailure)> {
        self.mirror
            .iter()
            .flat_map(|(id, report)| report.failures.iter().map(move |f| (id.as_str(), f)))
    }
}

/// Which tasks a manual reschedule covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleScope {
    /// Every schedulable task with a deadline
    All,
    Tasks(Vec<String>),
}

pub struct Planner {
    config: Config,
    tasks: TaskStore,
    learning: Arc<LearningStore>,
    estimator: Estimator,
    allocator: PhaseAllocator,
    rescheduler: Rescheduler,
    mirror: CalendarMirror,
}

impl Planner {
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn CalendarProvider>,
    ) -> Result<Self, CoreError> {
        Self::with_clock(config, store, provider, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn CalendarProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let learning = Arc::new(LearningStore::open(
            Arc::clone(&store),
            config.learning.clone(),
            config.estimation.clone(),
        )?);
        let estimator = Estimator::with_config(config.estimation.clone()).with_learning(learning.clone());
        let allocator = PhaseAllocator::new(AvailabilityFinder::new(
            Arc::clone(&provider),
            config.calendar_id.clone(),
        ))
        .with_clock(clock);
        let rescheduler = Rescheduler::new(estimator.clone(), allocator.clone(), config.history_limit)
            .with_policy(config.relaxation.clone())
            .with_store(Arc::clone(&store), config.history_limit)?;

        Ok(Self {
            tasks: TaskStore::new(store),
            learning,
            estimator,
            allocator,
            rescheduler,
            mirror: CalendarMirror::new(provider),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register listeners or inspect pass state.
    pub fn rescheduler(&self) -> &Rescheduler {
        &self.rescheduler
    }

    pub fn tasks(&self) -> Result<Vec<Task>, CoreError> {
        Ok(self.tasks.load_all()?)
    }

    pub fn task(&self, id: &str) -> Result<Task, CoreError> {
        self.tasks.get(id)
    }

    pub fn add_task(&self, task: Task) -> Result<Task, CoreError> {
        self.tasks.upsert(&task)?;
        tracing::debug!(task_id = %task.id, title = %task.title, "task added");
        Ok(task)
    }

    pub fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task, CoreError> {
        let mut task = self.tasks.get(id)?;
        task.transition_to(status)?;
        self.tasks.upsert(&task)?;
        Ok(task)
    }

    /// Learning-aware estimate for a stored task.
    pub fn estimate(&self, id: &str) -> Result<Estimation, CoreError> {
        let task = self.tasks.get(id)?;
        Ok(self.estimator.estimate(&task))
    }

    /// Estimate, allocate, mirror and persist a single task.
    pub async fn schedule_task(&self, id: &str) -> Result<ScheduleOutcome, CoreError> {
        let all = self.tasks.load_all()?;
        let mut task = all[resolve_index(&all, id)?].clone();
        if !task.status.is_schedulable() {
            return Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("{} tasks are not scheduled", task.status),
            }
            .into());
        }
        let deadline = task.deadline.ok_or_else(|| ScheduleError::MissingDeadline {
            task_id: task.id.clone(),
        })?;

        let estimation = self.estimator.estimate(&task);
        let own_events: HashSet<String> = task.provider_event_ids().into_iter().collect();
        let claimed: Vec<BusyInterval> = all
            .iter()
            .filter(|t| t.id != task.id && t.status.is_schedulable())
            .flat_map(|t| t.scheduled_blocks.iter().map(BusyInterval::from))
            .collect();
        let allocation = self
            .allocator
            .allocate_until(
                &task.id,
                &estimation,
                &self.config.working_hours,
                self.config.buffer_minutes,
                deadline,
                &own_events,
                &claimed,
            )
            .await?;

        let mut old_blocks = std::mem::take(&mut task.scheduled_blocks);
        let mut blocks = allocation.blocks;
        let mut failures = self.mirror.retract(&mut old_blocks).await;
        let mirrored = self.mirror.mirror(&mut blocks, &task.title).await;
        failures.extend(mirrored.failures);
        let report = MirrorReport {
            created: mirrored.created,
            failures,
        };

        task.estimation = Some(estimation);
        task.set_blocks(blocks);
        self.tasks.upsert(&task)?;

        tracing::info!(
            task_id = %task.id,
            blocks = task.scheduled_blocks.len(),
            mirrored = report.created,
            failures = report.failures.len(),
            "task scheduled"
        );
        Ok(ScheduleOutcome {
            task,
            degraded_days: allocation.degraded_days,
            mirror: report,
        })
    }

    /// Mark a task done and learn from its actual time.
    pub fn complete_task(&self, id: &str, actual: ActualTime) -> Result<(Task, LearningRecord), CoreError> {
        let mut task = self.tasks.get(id)?;
        task.transition_to(TaskStatus::Done)?;
        task.actual_time = Some(actual);
        let record = self.learning.record_actual(&task, &actual)?;
        self.tasks.upsert(&task)?;
        Ok((task, record))
    }

    /// Run a rescheduling pass over `scope` and mirror the new placements.
    ///
    /// Only the tasks in the pass are written back.
    pub async fn reschedule(
        &self,
        scope: RescheduleScope,
        reason: TriggerReason,
    ) -> Result<Option<RescheduleOutcome>, CoreError> {
        let all = self.tasks.load_all()?;
        let mut indices: Vec<usize> = match scope {
            RescheduleScope::All => all
                .iter()
                .enumerate()
                .filter(|(_, t)| t.status.is_schedulable() && t.deadline.is_some())
                .map(|(i, _)| i)
                .collect(),
            RescheduleScope::Tasks(ids) => ids
                .iter()
                .map(|id| resolve_index(&all, id))
                .collect::<Result<_, _>>()?,
        };
        let mut seen = HashSet::new();
        indices.retain(|&i| seen.insert(i));

        let before: Vec<Task> = indices.iter().map(|&i| all[i].clone()).collect();
        let mut affected = before.clone();
        let event = self
            .rescheduler
            .reschedule_affected(
                &mut affected,
                reason,
                &self.config.working_hours,
                self.config.buffer_minutes,
            )
            .await?;
        match event {
            Some(event) => self.commit(event, before, affected).await.map(Some),
            None => Ok(None),
        }
    }

    /// Reschedule the tasks whose mirrored blocks reference a changed event.
    pub async fn handle_external_change(
        &self,
        change: &ExternalChange,
    ) -> Result<Option<RescheduleOutcome>, CoreError> {
        if change.calendar_id != self.config.calendar_id {
            tracing::debug!(calendar_id = %change.calendar_id, "change on an untracked calendar");
            return Ok(None);
        }
        let mut all = self.tasks.load_all()?;
        let before = all.clone();
        let event = self
            .rescheduler
            .handle_external_change(
                change,
                &mut all,
                &self.config.working_hours,
                self.config.buffer_minutes,
            )
            .await?;
        let Some(event) = event else {
            return Ok(None);
        };

        let (before, affected): (Vec<Task>, Vec<Task>) = before
            .into_iter()
            .zip(all)
            .filter(|(old, _)| event.affected_task_ids.contains(&old.id))
            .unzip();
        self.commit(event, before, affected).await.map(Some)
    }

    pub fn insights(&self) -> LearningInsights {
        self.learning.insights()
    }

    pub fn learning(&self) -> &LearningStore {
        &self.learning
    }

    pub fn history(&self) -> Vec<ReschedulingEvent> {
        self.rescheduler.history()
    }

    /// Mirror every task of a finished pass and write those tasks back.
    ///
    /// Moved placements are retracted for all tasks before any new block is
    /// mirrored, so a task may take over time another task just vacated.
    async fn commit(
        &self,
        event: ReschedulingEvent,
        before: Vec<Task>,
        mut affected: Vec<Task>,
    ) -> Result<RescheduleOutcome, CoreError> {
        let mut retract_failures = Vec::with_capacity(affected.len());
        for (old, task) in before.into_iter().zip(&affected) {
            let mut old_blocks = old.scheduled_blocks;
            let failures = if old_blocks != task.scheduled_blocks {
                self.mirror.retract(&mut old_blocks).await
            } else {
                Vec::new()
            };
            retract_failures.push(failures);
        }

        let mut mirror = Vec::with_capacity(affected.len());
        for (task, mut failures) in affected.iter_mut().zip(retract_failures) {
            let title = task.title.clone();
            let mirrored = self.mirror.mirror(&mut task.scheduled_blocks, &title).await;
            failures.extend(mirrored.failures);
            let report = MirrorReport {
                created: mirrored.created,
                failures,
            };
            if !report.is_complete() {
                tracing::warn!(task_id = %task.id, failures = report.failures.len(), "calendar mirroring incomplete");
            }
            mirror.push((task.id.clone(), report));
        }

        self.tasks.upsert_many(&affected)?;
        Ok(RescheduleOutcome { event, mirror })
    }
}
