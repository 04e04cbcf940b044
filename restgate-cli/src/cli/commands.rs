// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line definitions

use clap::{Parser, Subcommand, ValueEnum};
use restgate::storage::StorageType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "restgate", version, about = "restgate gateway core operator tool")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway core and run until Ctrl-C / SIGTERM
    Serve {
        /// JSON config file; RESTGATE_* variables apply on top
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Session store directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Plugin directory to scan at startup
        #[arg(long)]
        plugin_dir: Option<PathBuf>,

        /// Comma-separated module allow-list
        #[arg(long)]
        allow: Option<String>,

        /// Storage backend (sled, memory)
        #[arg(long)]
        storage: Option<StorageType>,
    },

    /// Scan a plugin directory and show what would be registered
    Plugins {
        #[arg(long)]
        plugin_dir: PathBuf,

        /// Comma-separated module allow-list
        #[arg(long)]
        allow: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List active sessions held in the store
    Sessions {
        #[arg(long, default_value = "./restgate-data")]
        data_dir: PathBuf,

        /// Only sessions of this user
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
