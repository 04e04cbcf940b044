// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for restgate

use colored::Colorize;
use std::path::{Path, PathBuf};

use super::commands::OutputFormat;
use super::output::ReportFormatter;
use restgate::config::{parse_allow_list, GatewayConfig};
use restgate::plugin::{LoadReport, PluginLoader, PluginShutdown};
use restgate::session::{SessionRecord, SessionStore, TreeSessionStore, SESSIONS_TREE};
use restgate::storage::{create_storage_driver, StorageType};
use restgate::Gateway;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn allow_list(raw: Option<String>) -> Option<Vec<String>> {
    raw.map(|raw| parse_allow_list(&raw))
        .filter(|list| !list.is_empty())
}

/// Handle the serve command
///
/// Configuration is read from the file (or defaults), then `RESTGATE_*`
/// variables, then command-line flags.
pub fn handle_serve(
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    plugin_dir: Option<PathBuf>,
    allow: Option<String>,
    storage: Option<StorageType>,
) -> CliResult {
    let config = match config_path {
        Some(path) => GatewayConfig::from_json_file(&path)?,
        None => GatewayConfig::default(),
    };
    let mut config = config.overlay_env(|var| std::env::var(var).ok())?;
    if let Some(dir) = data_dir {
        config.storage.path = dir;
    }
    if let Some(dir) = plugin_dir {
        config.plugins.directory = Some(dir);
    }
    if let Some(list) = allow_list(allow) {
        config.plugins.allow_list = Some(list);
    }
    if let Some(storage) = storage {
        config.storage.storage_type = storage;
    }

    if config.storage.storage_type == StorageType::Sled {
        std::fs::create_dir_all(&config.storage.path)?;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        println!("{}", "Starting restgate...".bold().green());
        let gateway = Gateway::builder(config).start().await?;

        for descriptor in gateway.descriptors() {
            println!(
                "  → {} {} ({})",
                descriptor.name,
                descriptor.version,
                descriptor
                    .registered
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        println!("{}", ReportFormatter::health(&gateway.health()));
        println!("{}", "Press Ctrl-C to stop.".yellow());

        gateway.wait_for_shutdown().await;
        println!("{}", "restgate stopped".green());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Handle the plugins command
pub fn handle_plugins(plugin_dir: PathBuf, allow: Option<String>, format: OutputFormat) -> CliResult {
    if !plugin_dir.is_dir() {
        return Err(format!("Plugin directory not found: {}", plugin_dir.display()).into());
    }
    let loader = PluginLoader::native().with_allow_list(allow_list(allow));
    let report = scan_plugins(&loader, &plugin_dir);
    print!("{}", ReportFormatter::plugins(&report, format));
    Ok(())
}

/// Scan `plugin_dir`, then stop every module the scan brought up
fn scan_plugins(loader: &PluginLoader, plugin_dir: &Path) -> LoadReport {
    let report = loader.load(Some(plugin_dir));
    PluginShutdown::new(&report.registry).stop_all();
    report
}

/// Handle the sessions command
pub fn handle_sessions(data_dir: PathBuf, user: Option<String>, format: OutputFormat) -> CliResult {
    let store = open_session_store(&data_dir)?;

    let now = chrono::Utc::now();
    let mut records: Vec<SessionRecord> = Vec::new();
    store.range_active(&mut |record| {
        let wanted = user.as_deref().map_or(true, |user| record.user == user);
        if wanted && !record.is_expired(now) {
            records.push(record.clone());
        }
        true
    })?;
    records.sort_by(|a, b| b.last_access.cmp(&a.last_access));

    print!("{}", ReportFormatter::sessions(&records, format));
    Ok(())
}

fn open_session_store(data_dir: &Path) -> Result<TreeSessionStore, Box<dyn std::error::Error>> {
    if !data_dir.exists() {
        return Err(format!("Session store not found at {}", data_dir.display()).into());
    }
    let driver = create_storage_driver(StorageType::Sled, data_dir)?;
    if !driver.list_trees()?.iter().any(|name| name == SESSIONS_TREE) {
        return Err(format!(
            "No session records in {} store at {}",
            driver.storage_type(),
            data_dir.display()
        )
        .into());
    }
    log::debug!(
        "Reading sessions from {} store at {}",
        driver.storage_type(),
        data_dir.display()
    );
    Ok(TreeSessionStore::open(driver)?)
}
