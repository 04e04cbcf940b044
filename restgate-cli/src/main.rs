// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! restgate CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v wins over --log-level; RUST_LOG can still refine per module
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", restgate::CRATE_NAME.bold().green(), restgate::VERSION);
            println!("Session and plugin runtime for a database-backed REST gateway");
            Ok(())
        }

        Commands::Serve {
            config,
            data_dir,
            plugin_dir,
            allow,
            storage,
        } => cli::handle_serve(config, data_dir, plugin_dir, allow, storage),

        Commands::Plugins {
            plugin_dir,
            allow,
            format,
        } => cli::handle_plugins(plugin_dir, allow, format),

        Commands::Sessions {
            data_dir,
            user,
            format,
        } => cli::handle_sessions(data_dir, user, format),
    }
}
