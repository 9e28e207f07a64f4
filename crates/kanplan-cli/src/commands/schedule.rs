//! Scheduling commands for CLI.

use clap::{Subcommand, ValueEnum};
use kanplan_core::{RescheduleOutcome, RescheduleScope, TriggerReason};

use crate::common::Session;

#[derive(Clone, Copy, ValueEnum)]
pub enum ReasonArg {
    CalendarChange,
    TaskUpdate,
    ManualAdjustment,
}

impl From<ReasonArg> for TriggerReason {
    fn from(reason: ReasonArg) -> Self {
        match reason {
            ReasonArg::CalendarChange => TriggerReason::CalendarChange,
            ReasonArg::TaskUpdate => TriggerReason::TaskUpdate,
            ReasonArg::ManualAdjustment => TriggerReason::ManualAdjustment,
        }
    }
}

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Estimate and place a task's phases before its deadline
    Run {
        /// Task ID (or unique prefix)
        id: String,
    },
    /// Re-place tasks, relaxing constraints when they no longer fit
    Reschedule {
        /// Task IDs; every schedulable task with a deadline when omitted
        ids: Vec<String>,
        #[arg(long, value_enum, default_value = "manual-adjustment")]
        reason: ReasonArg,
    },
    /// Show recorded rescheduling events
    History {
        /// Number of most recent events to show
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let planner = &session.planner;

    match action {
        ScheduleAction::Run { id } => {
            let outcome = session.block_on(planner.schedule_task(&id))?;
            session.save_calendar()?;
            for block in &outcome.task.scheduled_blocks {
                println!(
                    "{:<14}  {} - {}",
                    block.phase.as_str(),
                    block.start_time.format("%Y-%m-%d %H:%M"),
                    block.end_time.format("%H:%M")
                );
            }
            for day in &outcome.degraded_days {
                eprintln!("warning: calendar unavailable on {day}; assumed free");
            }
            for failure in &outcome.mirror.failures {
                eprintln!("warning: not mirrored: {failure}");
            }
        }
        ScheduleAction::Reschedule { ids, reason } => {
            let scope = if ids.is_empty() {
                RescheduleScope::All
            } else {
                RescheduleScope::Tasks(ids)
            };
            match session.block_on(planner.reschedule(scope, reason.into()))? {
                Some(outcome) => {
                    session.save_calendar()?;
                    print_outcome(&outcome);
                }
                None => println!("A rescheduling pass is already running"),
            }
        }
        ScheduleAction::History { limit, json } => {
            let history = planner.history();
            let recent = &history[history.len().saturating_sub(limit)..];
            if json {
                println!("{}", serde_json::to_string_pretty(recent)?);
            } else {
                for event in recent {
                    println!(
                        "{}  {:?}  {} affected, {} changed",
                        event.timestamp.format("%Y-%m-%d %H:%M"),
                        event.reason,
                        event.affected_task_ids.len(),
                        event.changes.len()
                    );
                }
            }
        }
    }
    Ok(())
}

/// Summary line plus warnings for a finished pass.
pub fn print_outcome(outcome: &RescheduleOutcome) {
    let event = &outcome.event;
    println!(
        "Rescheduled {} task(s): {} changed, {} skipped",
        event.affected_task_ids.len(),
        event.changes.len(),
        event.skipped.len()
    );
    for skipped in &event.skipped {
        eprintln!("skipped {}: {}", skipped.task_id, skipped.reason);
    }
    for day in &event.degraded_days {
        eprintln!("warning: calendar unavailable on {day}; assumed free");
    }
    for (task_id, failure) in outcome.mirror_failures() {
        eprintln!("warning: not mirrored for {task_id}: {failure}");
    }
}
