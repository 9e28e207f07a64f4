//! Local calendar commands for CLI.
//!
//! Moving or removing an event is reported to the planner as an external
//! change, so tasks mirrored onto that event are rescheduled.

use clap::Subcommand;
use kanplan_core::{ChangeKind, ExternalChange};

use crate::common::{parse_datetime, Session};

#[derive(Subcommand)]
pub enum CalendarAction {
    /// List calendar events
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a busy event
    Add {
        /// Event title
        title: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Move an event
    Move {
        /// Event ID
        id: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Remove an event
    Remove {
        /// Event ID
        id: String,
    },
}

pub fn run(action: CalendarAction) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let hours = session.planner.config().working_hours.clone();
    let calendar_id = session.planner.config().calendar_id.clone();

    let change = match action {
        CalendarAction::List { json } => {
            let events = session.calendar.events();
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for event in &events {
                    println!(
                        "{}  {} - {}  {}",
                        event.id,
                        event.start_time.format("%Y-%m-%d %H:%M"),
                        event.end_time.format("%H:%M"),
                        event.title
                    );
                }
            }
            return Ok(());
        }
        CalendarAction::Add { title, start, end } => {
            let start = parse_datetime(&start, &hours)?;
            let end = parse_datetime(&end, &hours)?;
            if end <= start {
                return Err(kanplan_core::ValidationError::InvalidTimeRange { start, end }.into());
            }
            let id = session.calendar.add_busy(title, start, end);
            println!("Event created: {id}");
            ExternalChange {
                change_kind: ChangeKind::Created,
                external_event_id: id,
                calendar_id,
            }
        }
        CalendarAction::Move { id, start, end } => {
            let start = parse_datetime(&start, &hours)?;
            let end = parse_datetime(&end, &hours)?;
            if !session.calendar.move_event(&id, start, end) {
                return Err(format!("event not found: {id}").into());
            }
            println!("Event moved: {id}");
            ExternalChange {
                change_kind: ChangeKind::Updated,
                external_event_id: id,
                calendar_id,
            }
        }
        CalendarAction::Remove { id } => {
            if !session.calendar.remove(&id) {
                return Err(format!("event not found: {id}").into());
            }
            println!("Event removed: {id}");
            ExternalChange {
                change_kind: ChangeKind::Deleted,
                external_event_id: id,
                calendar_id,
            }
        }
    };

    session.save_calendar()?;
    if let Some(outcome) = session.block_on(session.planner.handle_external_change(&change))? {
        session.save_calendar()?;
        super::schedule::print_outcome(&outcome);
    }
    Ok(())
}
