use std::sync::Arc;

use clap::Subcommand;
use restwise_core::{
    ActivationOutcome, Config, Event, RestContext, RestEngine, SystemClock, TimerController,
    TimerOptions,
};
use tracing::{debug, warn};

use super::{build_engine, runtime, SetArgs};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Run a live countdown for the rest after this set, printing one JSON event per line.
    /// Ctrl-C skips the remaining rest.
    Run {
        #[command(flatten)]
        set: SetArgs,
        /// Alert checkpoint in seconds (repeatable, replaces the configured list)
        #[arg(long = "checkpoint")]
        checkpoints: Vec<u32>,
        /// Keep running past the recommendation until skipped
        #[arg(long)]
        no_auto_complete: bool,
    },
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TimerAction::Run {
            set,
            checkpoints,
            no_auto_complete,
        } => {
            let config = Config::load()?;
            let mut options = config.timer.clone();
            if !checkpoints.is_empty() {
                options = options.with_checkpoints(checkpoints);
            }
            if no_auto_complete {
                options = options.with_auto_complete(false);
            }
            options.validate()?;

            let engine = build_engine(&config, &set)?;
            runtime()?.block_on(countdown(engine, options, set.context()))
        }
    }
}

async fn countdown(
    engine: RestEngine,
    options: TimerOptions,
    context: RestContext,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = TimerController::new(engine, Arc::new(SystemClock::new()), options);
    let mut events = controller.subscribe();

    if let ActivationOutcome::Fallback { error, .. } = controller.activate(context).await {
        warn!(%error, "no recommendation available");
        eprintln!("warning: {error}; using the default rest duration");
    }
    controller.start();
    controller.spawn_ticker();

    loop {
        tokio::select! {
            received = events.recv() => {
                let Some(event) = received else { break };
                print_event(&event)?;
                if event.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted, skipping remaining rest");
                controller.skip();
            }
        }
    }

    controller.stop_ticker();
    Ok(())
}

fn print_event(event: &Event) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
