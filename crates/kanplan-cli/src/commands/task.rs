//! Task management commands for CLI.

use clap::Subcommand;
use kanplan_core::{ActualTime, Priority, Task, TaskStatus};

use crate::common::{parse_datetime, parse_phase_minutes, short_id, split_list, Session};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task title
        title: String,
        /// Deadline (YYYY-MM-DD HH:MM, YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        deadline: Option<String>,
        /// Reminder instant, independent of the deadline
        #[arg(long)]
        notify: Option<String>,
        /// low, normal or high
        #[arg(long, default_value = "normal")]
        priority: String,
        /// Project name
        #[arg(long)]
        project: Option<String>,
        /// Comma-separated keywords
        #[arg(long)]
        keywords: Option<String>,
        /// Create as a note (never scheduled)
        #[arg(long)]
        note: bool,
    },
    /// List tasks
    List {
        /// Filter by status (todo, doing, done, note)
        #[arg(long)]
        status: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show task details as JSON
    Show {
        /// Task ID (or unique prefix)
        id: String,
    },
    /// Change the status of a task
    Status {
        /// Task ID (or unique prefix)
        id: String,
        /// todo, doing, done or note
        status: String,
    },
    /// Mark a task done and record the time it actually took
    Complete {
        /// Task ID (or unique prefix)
        id: String,
        /// Minutes per phase: incubation,design,implementation,improvement
        #[arg(long)]
        actual: String,
    },
    /// Show the current estimate for a task
    Estimate {
        /// Task ID (or unique prefix)
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let planner = &session.planner;
    let hours = &planner.config().working_hours;

    match action {
        TaskAction::Add {
            title,
            deadline,
            notify,
            priority,
            project,
            keywords,
            note,
        } => {
            let mut task = Task::new(title).with_priority(priority.parse::<Priority>()?);
            if let Some(deadline) = deadline {
                task = task.with_deadline(parse_datetime(&deadline, hours)?);
            }
            if let Some(notify) = notify {
                task.notify_at = Some(parse_datetime(&notify, hours)?);
            }
            if let Some(project) = project {
                task = task.with_project(project);
            }
            if let Some(keywords) = keywords {
                task = task.with_keywords(split_list(&keywords));
            }
            if note {
                task.status = TaskStatus::Note;
            }
            let task = planner.add_task(task)?;
            println!("Task created: {}", task.id);
        }
        TaskAction::List { status, json } => {
            let filter = status.map(|s| s.parse::<TaskStatus>()).transpose()?;
            let tasks: Vec<Task> = planner
                .tasks()?
                .into_iter()
                .filter(|t| filter.map_or(true, |s| t.status == s))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    let deadline = task
                        .deadline
                        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{}  {:<5}  {:<16}  {:>2} blocks  {}",
                        short_id(&task.id),
                        task.status,
                        deadline,
                        task.scheduled_blocks.len(),
                        task.title
                    );
                }
            }
        }
        TaskAction::Show { id } => {
            let task = planner.task(&id)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Status { id, status } => {
            let task = planner.set_status(&id, status.parse::<TaskStatus>()?)?;
            println!("Task {} is now {}", task.id, task.status);
        }
        TaskAction::Complete { id, actual } => {
            let [incubation, design, implementation, improvement] = parse_phase_minutes(&actual)?;
            let actual = ActualTime::new(incubation, design, implementation, improvement);
            let (task, record) = planner.complete_task(&id, actual)?;
            println!("Task completed: {}", task.id);
            println!(
                "Category '{}': accuracy {:.3} after {} samples",
                record.category, record.accuracy, record.sample_count
            );
        }
        TaskAction::Estimate { id } => {
            let estimation = planner.estimate(&id)?;
            println!("{}", serde_json::to_string_pretty(&estimation)?);
        }
    }
    Ok(())
}
