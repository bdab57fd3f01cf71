// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! State shared by inbound and outbound call entities.
//!
//! # Lifecycle
//!
//! ```text
//! Started ──complete──▶ Completed
//!    │
//!    └────fail────────▶ Failed
//! ```
//!
//! Both end states are terminal. Duration, status code and the remote
//! application id are written by the single transition out of `Started`; a
//! second transition is rejected with [`AutocollectError::CallAlreadyFinalized`]
//! and leaves the entity unchanged.

use std::time::{Instant, SystemTime};

use serde_json::Value;

use crate::contracts::{Properties, Tags, Telemetry};
use crate::error::AutocollectError;

/// Property key holding the failure message of a call.
pub const ERROR_PROPERTY: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Started,
    Completed,
    Failed,
}

/// Start time and measured duration of one call.
#[derive(Debug, Clone)]
pub struct CallTiming {
    start_time: SystemTime,
    started: Instant,
    duration_ms: Option<u64>,
    state: CallState,
}

impl CallTiming {
    /// Captures the call start.
    pub fn start() -> Self {
        Self {
            start_time: SystemTime::now(),
            started: Instant::now(),
            duration_ms: None,
            state: CallState::Started,
        }
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Milliseconds between start and end, `None` while the call is in flight.
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Replaces the measured duration with one taken by the caller.
    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.duration_ms = Some(duration_ms);
    }

    /// Moves out of `Started` and records the duration.
    pub fn finish(&mut self, end_state: CallState) -> Result<u64, AutocollectError> {
        if self.state != CallState::Started {
            return Err(AutocollectError::CallAlreadyFinalized);
        }
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.duration_ms = Some(elapsed);
        self.state = end_state;
        Ok(elapsed)
    }
}

/// Why an observed call failed.
///
/// Failures come in whatever shape the HTTP stack produced: an error value, a
/// bare string, or a structured object. Each shape is turned into printable
/// properties by [`CallError::record_into`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// A raw string.
    Message(String),
    /// The message of an error value.
    Error(String),
    /// A plain structured value; each field becomes its own property.
    Fields(serde_json::Map<String, Value>),
}

impl CallError {
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        CallError::Error(error.to_string())
    }

    /// Writes the failure details into `properties`.
    pub fn record_into(&self, properties: &mut Properties) {
        match self {
            CallError::Message(message) | CallError::Error(message) => {
                properties.insert(ERROR_PROPERTY.to_string(), message.clone());
            }
            CallError::Fields(fields) => {
                for (key, value) in fields {
                    let printable = match value {
                        Value::Null => continue,
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    properties.insert(key.clone(), printable);
                }
            }
        }
    }
}

impl From<&str> for CallError {
    fn from(message: &str) -> Self {
        CallError::Message(message.to_string())
    }
}

impl From<String> for CallError {
    fn from(message: String) -> Self {
        CallError::Message(message)
    }
}

impl From<Value> for CallError {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => CallError::Fields(fields),
            Value::String(message) => CallError::Message(message),
            other => CallError::Message(other.to_string()),
        }
    }
}

/// `0 < status < 400`. A call without a status is never successful.
pub fn is_success(status_code: Option<u16>) -> bool {
    status_code.is_some_and(|code| 0 < code && code < 400)
}

/// Capabilities shared by inbound requests and outbound dependencies.
pub trait CallEntity {
    fn timing(&self) -> &CallTiming;

    fn status_code(&self) -> Option<u16>;

    fn properties(&self) -> &Properties;

    /// Application id of the other party, empty when it did not identify itself.
    fn their_app_id(&self) -> &str;

    /// The wire-ready record describing this call.
    fn telemetry(&self) -> Telemetry;

    /// Context tags for the record, given the tags already in effect.
    fn tags(&self, ambient: &Tags) -> Tags;

    fn is_success(&self) -> bool {
        is_success(self.status_code())
    }
}
