// ABOUTME: Protocol lifecycle events and the non-blocking emission seam
// ABOUTME: Code issuance, token issuance/refresh/revocation notifications
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

/// Protocol lifecycle events. Emission is observational only: sinks must
/// not block and their failures never affect protocol correctness.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    CodeIssued {
        client_id: Uuid,
        user_id: String,
    },
    TokenIssued {
        token_id: Uuid,
        client_id: Uuid,
        user_id: Option<String>,
        grant_type: &'static str,
    },
    TokenRefreshed {
        token_id: Uuid,
        client_id: Uuid,
        previous_token_id: Uuid,
    },
    TokenRevoked {
        token_id: Uuid,
    },
}

/// Event sink contract: `emit` must return promptly. Implementations that
/// do real work should hand the event to a task or channel.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

/// Default sink: structured log lines at debug level
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: AuthEvent) {
        debug!(?event, "auth event");
    }
}

/// Fan an event out to several sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: AuthEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
