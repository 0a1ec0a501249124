use clap::Subcommand;
use restwise_core::Config;
use serde::Serialize;

#[derive(Subcommand)]
pub enum ExercisesAction {
    /// List every known exercise with its difficulty class
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ExerciseEntry<'a> {
    id: &'a str,
    class: restwise_core::DifficultyClass,
    base_rest_seconds: u32,
}

pub fn run(action: ExercisesAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ExercisesAction::List { json } => {
            let config = Config::load()?;
            let catalogue = config.catalogue();
            let entries: Vec<ExerciseEntry<'_>> = catalogue
                .entries()
                .map(|(id, class)| ExerciseEntry {
                    id,
                    class,
                    base_rest_seconds: config.rest.base.for_class(class),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!("{:<24} {:<10} {}s", entry.id, entry.class, entry.base_rest_seconds);
                }
            }
        }
    }
    Ok(())
}
