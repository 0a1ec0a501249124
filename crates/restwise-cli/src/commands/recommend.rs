use restwise_core::Config;

use super::{build_engine, runtime, SetArgs};

pub fn run(args: SetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let engine = build_engine(&config, &args)?;
    let context = args.context();

    let calculation = runtime()?.block_on(engine.calculate(
        &context.user_id,
        &context.exercise_id,
        &context.input,
    ))?;
    println!("{}", serde_json::to_string_pretty(&calculation)?);
    Ok(())
}
