use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "restwise", version, about = "Adaptive rest timer for strength training")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a rest recommendation for the set just performed
    Recommend(commands::SetArgs),
    /// Live rest countdown
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Exercise catalogue
    Exercises {
        #[command(subcommand)]
        action: commands::exercises::ExercisesAction,
    },
    /// Recorded rest history
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    // stdout carries JSON; diagnostics go to stderr.
    let filter = EnvFilter::try_from_env("RESTWISE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Recommend(args) => commands::recommend::run(args),
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Exercises { action } => commands::exercises::run(action),
        Commands::History { action } => commands::history::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
