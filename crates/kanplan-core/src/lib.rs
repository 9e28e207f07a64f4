//! # Kanplan Core Library
//!
//! Deadline-driven scheduling for short task entries. A task with a deadline
//! is split into four ordered work phases which are placed into free calendar
//! time inside declared working hours. The `kanplan` CLI is a thin layer over
//! this crate.
//!
//! ## Architecture
//!
//! - **Estimation**: priority-based baseline adjusted by learned per-category
//!   accuracy and phase distribution
//! - **Timeline**: free-slot search over calendar busy time
//! - **Scheduler**: greedy earliest-first phase allocation and a single-flight
//!   rescheduler with a relaxation ladder
//! - **Storage**: key-value persistence (SQLite or memory) and TOML configuration
//!
//! ## Key Components
//!
//! - [`Planner`]: composing service used by front ends
//! - [`Estimator`]: phase estimates for a task
//! - [`LearningStore`]: learned estimation statistics
//! - [`PhaseAllocator`]: places phase blocks before a deadline
//! - [`Rescheduler`]: reconciles schedules after calendar or task changes
//! - [`CalendarProvider`]: trait for external calendars

pub mod calendar;
pub mod clock;
pub mod error;
pub mod estimate;
pub mod events;
pub mod learning;
pub mod planner;
pub mod schedule;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod timeline;

pub use calendar::{BusyInterval, CalendarMirror, CalendarProvider, LocalCalendar, MirrorReport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConfigError, CoreError, ProviderError, ScheduleError, StorageError, ValidationError};
pub use estimate::{Estimator, LearningLookup};
pub use events::{ChangeKind, ExternalChange, ReschedulingEvent, ScheduleChange, TriggerReason};
pub use learning::{LearningInsights, LearningRecord, LearningStore};
pub use planner::{Planner, RescheduleOutcome, RescheduleScope, ScheduleOutcome};
pub use schedule::{ActualTime, Estimation, Phase, ScheduleWindow, ScheduledBlock, TimeSlot, WorkingHours};
pub use scheduler::{Allocation, PhaseAllocator, RelaxationPolicy, RescheduleState, Rescheduler};
pub use storage::{Config, KeyValueStore, MemoryStore, SqliteStore, TaskStore};
pub use task::{Priority, Task, TaskStatus};
pub use timeline::{AvailabilityFinder, FreeSlots};
