use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use restwise_core::{PerformanceInput, SetRecord};

use super::{history_path, load_history};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Record the rest actually taken after a set
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        exercise: String,
        #[arg(long)]
        set: u32,
        /// Rate of perceived exertion, 1-10
        #[arg(long)]
        rpe: Option<u8>,
        /// Seconds of rest taken before the next set
        #[arg(long)]
        rest: u32,
        /// History file (defaults to history.json in the data directory)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print the aggregated profile for a user and exercise as JSON
    Show {
        #[arg(long)]
        user: String,
        #[arg(long)]
        exercise: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub fn run(action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        HistoryAction::Add {
            user,
            exercise,
            set,
            rpe,
            rest,
            file,
        } => {
            let mut input = PerformanceInput::new(set, 0);
            input.perceived_effort = rpe;
            input.validate()?;

            let path = history_path(file)?;
            let history = load_history(&path)?;
            history.record(SetRecord {
                user_id: user,
                exercise_id: exercise,
                set_number: set,
                perceived_effort: rpe,
                rest_taken_seconds: rest,
                recorded_at: Utc::now(),
            });
            history.save(&path)?;
            println!("recorded ({} sets)", history.len());
        }
        HistoryAction::Show {
            user,
            exercise,
            file,
        } => {
            let history = load_history(&history_path(file)?)?;
            match history.profile(&user, &exercise) {
                Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
                None => println!("null"),
            }
        }
    }
    Ok(())
}
