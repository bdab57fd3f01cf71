// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Automatic telemetry for HTTP requests and dependencies.
//!
//! Inbound requests and outbound calls are observed through explicit hooks
//! (the collectors, or the tower layers in [`middleware`]), turned into
//! request and remote-dependency records, and correlated across services with
//! the `Request-Context` header and the ambient [`correlation`] context.
//!
//! Hosts install log output with [`telemetry::init_logging_from_config`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod app_id;
pub mod call;
pub mod carrier;
pub mod client;
pub mod collector;
pub mod config;
pub mod contracts;
pub mod correlation;
pub mod dependency;
pub mod error;
pub mod headers;
pub mod identity;
pub mod message;
pub mod middleware;
pub mod request;
pub mod request_context;
pub mod telemetry;
pub mod url_builder;

#[cfg(test)]
pub(crate) mod test_utils;

pub use call::{CallError, CallState};
pub use client::{CallContext, Client, TelemetrySink};
pub use collector::dependency::{HttpDependencyCollector, PendingDependency};
pub use collector::request::{HttpRequestCollector, PendingRequest, RequestObservation};
pub use config::Config;
pub use contracts::{Properties, Tags, Telemetry};
pub use correlation::{CorrelationContext, CorrelationContextManager, Operation};
pub use dependency::HttpDependencyCall;
pub use error::{AutocollectError, CallKind};
pub use message::{IncomingRequest, IncomingResponse, OutgoingRequest, ServerResponse};
pub use middleware::{DependencyTelemetryLayer, RequestTelemetryLayer, TrackedBody, TransportInfo};
pub use request::HttpRequestCall;
pub use url_builder::{RequestOptions, RequestTarget};
