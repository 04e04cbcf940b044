//! Test utilities for restgate integration tests
//!
//! - `plugins`: small in-process modules (recording audit, failing audit,
//!   reports extension, validators, auth) served through `InProcessOpener`
//! - `gateway_fixture`: a started `Gateway` on an in-memory store with a
//!   manual clock and no signal listener

#![allow(dead_code)]

pub mod gateway_fixture;
pub mod plugins;
