pub mod config;
pub mod exercises;
pub mod history;
pub mod recommend;
pub mod timer;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use restwise_core::storage::data_dir;
use restwise_core::{Config, InMemoryHistory, PerformanceInput, RestContext, RestEngine};

/// The set just performed.
#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    /// User identifier
    #[arg(long)]
    pub user: String,
    /// Exercise identifier (see `restwise exercises list`)
    #[arg(long)]
    pub exercise: String,
    /// Set number, starting at 1
    #[arg(long)]
    pub set: u32,
    /// Repetitions completed
    #[arg(long)]
    pub reps: u32,
    /// Load in kilograms
    #[arg(long)]
    pub weight: Option<f64>,
    /// Rate of perceived exertion, 1-10
    #[arg(long)]
    pub rpe: Option<u8>,
    /// History file (defaults to history.json in the data directory)
    #[arg(long)]
    pub history: Option<PathBuf>,
}

impl SetArgs {
    pub fn context(&self) -> RestContext {
        let mut input = PerformanceInput::new(self.set, self.reps);
        input.weight_kg = self.weight;
        input.perceived_effort = self.rpe;
        RestContext::new(&self.user, &self.exercise, input)
    }
}

pub fn history_path(explicit: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(data_dir()?.join("history.json")),
    }
}

/// History from disk, or an empty store when the file does not exist yet.
pub fn load_history(path: &std::path::Path) -> Result<InMemoryHistory, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(InMemoryHistory::load(path)?)
    } else {
        Ok(InMemoryHistory::new())
    }
}

/// Engine wired to the configured catalogue, tuning and history file.
pub fn build_engine(config: &Config, args: &SetArgs) -> Result<RestEngine, Box<dyn std::error::Error>> {
    let history = load_history(&history_path(args.history.clone())?)?;
    let engine = RestEngine::new(Arc::new(config.catalogue()), Arc::new(history))
        .with_tuning(config.rest.clone());
    Ok(engine)
}

pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
