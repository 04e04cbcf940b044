// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for restgate
//!
//! Runs the gateway core standalone and inspects its plugin directory and
//! session store.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{handle_plugins, handle_serve, handle_sessions};
