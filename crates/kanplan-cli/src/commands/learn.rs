//! Learning statistics commands for CLI.

use clap::Subcommand;

use crate::common::Session;

#[derive(Subcommand)]
pub enum LearnAction {
    /// Per-category accuracy summary
    Insights {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Raw recorded samples, newest last
    Samples {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: LearnAction) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;

    match action {
        LearnAction::Insights { json } => {
            let insights = session.planner.insights();
            if json {
                println!("{}", serde_json::to_string_pretty(&insights)?);
            } else {
                for (category, accuracy) in &insights.per_category_accuracy {
                    println!("{category:<16} {accuracy:.3}");
                }
                println!(
                    "overall {:.3} across {} samples",
                    insights.overall_accuracy, insights.total_records_learned
                );
            }
        }
        LearnAction::Samples { limit } => {
            let samples = session.planner.learning().samples();
            let recent = &samples[samples.len().saturating_sub(limit)..];
            println!("{}", serde_json::to_string_pretty(recent)?);
        }
    }
    Ok(())
}
