// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use restgate::plugin::{LoadReport, PluginDescriptor, SkippedPlugin};
use restgate::session::SessionRecord;
use restgate::GatewayHealth;

use super::commands::OutputFormat;

pub struct ReportFormatter;

impl ReportFormatter {
    /// Plugin scan results
    pub fn plugins(report: &LoadReport, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::plugins_table(&report.descriptors, &report.skipped),
            OutputFormat::Json => Self::pretty(&serde_json::json!({
                "loaded": report.descriptors.iter().map(|d| serde_json::json!({
                    "id": d.id,
                    "name": d.name,
                    "version": d.version,
                    "declared": d.capabilities.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    "registered": d.registered.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    "path": d.path.display().to_string(),
                })).collect::<Vec<_>>(),
                "skipped": report.skipped.iter().map(|s| serde_json::json!({
                    "path": s.path.display().to_string(),
                    "capability": s.capability.map(|c| c.as_str()),
                    "reason": s.reason,
                })).collect::<Vec<_>>(),
                "summary": {
                    "extend": report.registry.summary().extend,
                    "validators": report.registry.summary().validators,
                },
            })),
        }
    }

    fn plugins_table(descriptors: &[PluginDescriptor], skipped: &[SkippedPlugin]) -> String {
        if descriptors.is_empty() && skipped.is_empty() {
            return format!("{}\n", "No plugins found".yellow());
        }

        let mut output = String::new();
        output.push_str(&format!("{}\n", "Loaded Plugins".bold().green()));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["Id", "Name", "Version", "Registered", "Missing"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green))
                .collect::<Vec<_>>(),
        );
        for descriptor in descriptors {
            table.add_row(vec![
                descriptor.id.clone(),
                descriptor.name.clone(),
                descriptor.version.clone(),
                Self::join(descriptor.registered.iter().map(|c| c.as_str())),
                Self::join(descriptor.missing().iter().map(|c| c.as_str())),
            ]);
        }
        output.push_str(&table.to_string());
        output.push('\n');

        if !skipped.is_empty() {
            output.push_str(&format!("\n{}\n", "Skipped:".bold().yellow()));
            for (i, skip) in skipped.iter().enumerate() {
                let what = match skip.capability {
                    Some(capability) => format!("{} ({})", skip.path.display(), capability),
                    None => skip.path.display().to_string(),
                };
                output.push_str(&format!("  {}. {}: {}\n", i + 1, what, skip.reason.yellow()));
            }
        }
        output
    }

    /// Stored session records
    pub fn sessions(records: &[SessionRecord], format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => Self::pretty(&serde_json::json!({
                "count": records.len(),
                "sessions": records,
            })),
            OutputFormat::Table => {
                if records.is_empty() {
                    return format!("{}\n", "No active sessions".yellow());
                }
                let now = chrono::Utc::now();
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(
                    ["Session", "User", "Created", "Last Access", "Expires"]
                        .iter()
                        .map(|h| Cell::new(h).fg(Color::Green))
                        .collect::<Vec<_>>(),
                );
                for record in records {
                    let expires = record.expires_at.format("%Y-%m-%d %H:%M:%S").to_string();
                    table.add_row(vec![
                        Cell::new(record.uuid),
                        Cell::new(&record.user),
                        Cell::new(record.created_at.format("%Y-%m-%d %H:%M:%S")),
                        Cell::new(record.last_access.format("%Y-%m-%d %H:%M:%S")),
                        if record.is_expired(now) {
                            Cell::new(expires).fg(Color::Red)
                        } else {
                            Cell::new(expires)
                        },
                    ]);
                }
                format!(
                    "{}\n{}\nSessions: {}\n",
                    "Active Sessions".bold().green(),
                    table,
                    records.len()
                )
            }
        }
    }

    /// One-line startup banner
    pub fn health(health: &GatewayHealth) -> String {
        let persistence = if health.is_degraded() {
            "degraded".red()
        } else {
            "healthy".green()
        };
        format!(
            "plugins: {} loaded, {} skipped | audit hook: {} | persistence: {}",
            health.plugins_loaded,
            health.plugins_skipped,
            if health.audit_hook { "on" } else { "off" },
            persistence
        )
    }

    fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
        let joined = items.collect::<Vec<_>>().join(", ");
        if joined.is_empty() {
            "-".to_string()
        } else {
            joined
        }
    }

    fn pretty(value: &serde_json::Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize output to JSON\"}".to_string()
        })
    }
}
