// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Data change fan-out

use crate::plugin::error::panic_message;
use crate::plugin::{CapabilityRegistry, DataEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub struct DataEventChain {
    registry: Arc<CapabilityRegistry>,
}

impl DataEventChain {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Notify every data event module; returns how many accepted the event
    pub fn publish(&self, event: &DataEvent) -> usize {
        let mut delivered = 0;
        for (id, plugin) in self.registry.data_event() {
            match catch_unwind(AssertUnwindSafe(|| plugin.on_data_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => log::warn!(
                    "Data event module {} failed on {}.{:?}: {}",
                    id,
                    event.table,
                    event.operation,
                    e
                ),
                Err(payload) => log::error!(
                    "Data event module {} panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                ),
            }
        }
        delivered
    }
}
