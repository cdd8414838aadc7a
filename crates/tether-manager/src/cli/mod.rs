/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
/// Tether Manager CLI
///
/// Runs the agent update engine or inspects its resolved configuration.
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true, env = "TETHER_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the manager
    Serve {
        /// YAML file of resources loaded into the store at startup
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Print the resolved configuration and exit
    CheckConfig,
}
