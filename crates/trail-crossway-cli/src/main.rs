use trail_crossway_cli::{Settings, logging, run};

fn main() -> anyhow::Result<()> {
    let settings = Settings::from_cli();
    let guard = logging::setup_logging_and_profiling(settings.verbose);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), ?settings, "Starting");

    let output = run(&settings)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !output.success {
        drop(guard);
        std::process::exit(2);
    }
    Ok(())
}
