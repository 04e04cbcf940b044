// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-request identity context

use super::models::Principal;
use super::request::GatewayRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identity and request carried through one request's dispatch points
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Arc<Principal>,
    pub session_id: Option<Uuid>,
    pub request: GatewayRequest,
    started: Instant,
}

impl RequestContext {
    pub fn new(principal: Arc<Principal>, request: GatewayRequest) -> Self {
        Self {
            principal,
            session_id: None,
            request,
            started: Instant::now(),
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Time since the request entered the gateway
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
