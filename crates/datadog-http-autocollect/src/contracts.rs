// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry record shapes handed to the sink.
//!
//! Records are wrapped in a [`Data`] envelope carrying the record type:
//!
//! ```text
//! {
//!   "baseType": "Microsoft.ApplicationInsights.RequestData",
//!   "baseData": { "id": "...", "name": "GET /search", "duration": "00:00:00.042", ... }
//! }
//! ```

use std::collections::HashMap;

use serde::Serialize;

/// Free-form diagnostic properties attached to a record.
pub type Properties = HashMap<String, String>;

/// Context tags sent alongside a record (`ai.operation.id`, ...).
pub type Tags = HashMap<String, String>;

pub const REQUEST_DATA_TYPE: &str = "Microsoft.ApplicationInsights.RequestData";
pub const REMOTE_DEPENDENCY_DATA_TYPE: &str = "Microsoft.ApplicationInsights.RemoteDependencyData";

/// Dependency type for plain HTTP calls.
pub const DEPENDENCY_TYPE_HTTP: &str = "Http";

/// Dependency type when the callee answered with its own application id.
pub const DEPENDENCY_TYPE_HTTP_TRACKED: &str = "Http (tracked component)";

/// Context tag keys.
pub mod context_tag_keys {
    pub const LOCATION_IP: &str = "ai.location.ip";
    pub const SESSION_ID: &str = "ai.session.id";
    pub const USER_ID: &str = "ai.user.id";
    pub const USER_AGENT: &str = "ai.user.agent";
    pub const OPERATION_ID: &str = "ai.operation.id";
    pub const OPERATION_NAME: &str = "ai.operation.name";
    pub const OPERATION_PARENT_ID: &str = "ai.operation.parentId";
}

/// Envelope around a record, tagged with its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Data<T> {
    pub base_type: String,
    pub base_data: T,
}

/// An inbound call handled by this process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Application id of the caller, empty if unknown.
    pub source: String,
    pub duration: String,
    pub response_code: Option<String>,
    pub success: bool,
    pub properties: Properties,
}

/// An outbound call made by this process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDependencyData {
    pub name: String,
    #[serde(rename = "type")]
    pub dependency_type: String,
    pub target: String,
    /// Full URL, query string included.
    pub data: String,
    pub duration: String,
    pub result_code: Option<String>,
    pub success: bool,
    pub properties: Properties,
}

/// Any record produced by this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Telemetry {
    Request(Data<RequestData>),
    RemoteDependency(Data<RemoteDependencyData>),
}

impl Telemetry {
    pub fn base_type(&self) -> &str {
        match self {
            Telemetry::Request(data) => &data.base_type,
            Telemetry::RemoteDependency(data) => &data.base_type,
        }
    }
}

/// Formats a millisecond duration as `[d.]hh:mm:ss.fff`.
///
/// ```
/// use datadog_http_autocollect::contracts::ms_to_time_span;
///
/// assert_eq!(ms_to_time_span(42), "00:00:00.042");
/// assert_eq!(ms_to_time_span(90_061_001), "1.01:01:01.001");
/// ```
pub fn ms_to_time_span(total_ms: u64) -> String {
    let millis = total_ms % 1000;
    let seconds = (total_ms / 1000) % 60;
    let minutes = (total_ms / (1000 * 60)) % 60;
    let hours = (total_ms / (1000 * 60 * 60)) % 24;
    let days = total_ms / (1000 * 60 * 60 * 24);

    let time = format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}");
    if days > 0 {
        format!("{days}.{time}")
    } else {
        time
    }
}
