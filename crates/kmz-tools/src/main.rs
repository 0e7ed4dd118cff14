mod commands;
mod logging;
mod metadata;
mod reporter;
mod settings;

use anyhow::Result;
use clap::Parser;
use settings::Settings;

fn main() -> Result<()> {
    let settings = Settings::parse();
    let _logging = logging::setup_logging_and_profiling();
    metadata::log_version_info();

    commands::run(&settings)
}
