// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for HTTP auto-collection.
//!
//! Only integration mistakes surface as errors. Malformed headers, partial URL
//! options and unreadable cookies degrade to best-effort values, and a failed
//! HTTP call is recorded as telemetry rather than returned as an error.

use std::fmt;

/// The two kinds of observed HTTP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// A call received by this process.
    Request,
    /// A call made by this process to another service.
    Dependency,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Request => write!(f, "request"),
            CallKind::Dependency => write!(f, "dependency"),
        }
    }
}

/// Errors that can occur when wiring up HTTP auto-collection
#[derive(Debug, thiserror::Error)]
pub enum AutocollectError {
    #[error("HTTP {0} tracking is already registered for this process")]
    CollectorAlreadyRegistered(CallKind),

    #[error("Call has already been completed")]
    CallAlreadyFinalized,

    #[error("Instrumentation key not found, pass the key in the config or set APPINSIGHTS_INSTRUMENTATIONKEY")]
    MissingInstrumentationKey,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AutocollectError::CollectorAlreadyRegistered(CallKind::Dependency);
        assert_eq!(
            error.to_string(),
            "HTTP dependency tracking is already registered for this process"
        );

        let error = AutocollectError::InvalidConfig("bad level".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: bad level");
    }

    #[test]
    fn test_call_kind_display() {
        assert_eq!(CallKind::Request.to_string(), "request");
        assert_eq!(CallKind::Dependency.to_string(), "dependency");
    }
}
