/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Tether Manager CLI application

use clap::Parser;
use tether_manager::cli::{commands, Cli, Commands};
use tether_utils::Settings;

/// Main function to run the Tether Manager application
///
/// Loads configuration, initializes logging and tracing, and executes the
/// requested command.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::new(cli.config.clone())?;

    match cli.command {
        Commands::Serve { seed } => {
            tether_utils::telemetry::init(
                &settings.telemetry.for_manager(),
                &settings.log.level,
                &settings.log.format,
            )?;
            commands::serve(&settings, seed).await?
        }
        Commands::CheckConfig => {
            tether_utils::logging::init_with_format(&settings.log.level, &settings.log.format)?;
            commands::check_config(&settings)?
        }
    }

    Ok(())
}
