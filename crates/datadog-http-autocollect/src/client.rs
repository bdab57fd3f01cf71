// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hand-off point between the collectors and the telemetry pipeline.

use std::sync::Arc;

use tracing::debug;

use crate::call::CallError;
use crate::config::Config;
use crate::contracts::{Tags, Telemetry};
use crate::message::{IncomingRequest, IncomingResponse, OutgoingRequest, ServerResponse};
use crate::url_builder::RequestTarget;

/// The raw HTTP objects a record was built from.
#[derive(Debug, Clone)]
pub enum CallContext {
    ServerRequest {
        request: IncomingRequest,
        response: ServerResponse,
        error: Option<CallError>,
    },
    ClientRequest {
        target: RequestTarget,
        request: OutgoingRequest,
        response: Option<IncomingResponse>,
        error: Option<CallError>,
    },
}

/// Receives finished records. Batching, sampling and transport live behind
/// this trait.
pub trait TelemetrySink: Send + Sync {
    fn track(&self, record: Telemetry, tags: Tags, context: CallContext);
}

/// Configuration, ambient context tags and the sink, shared by all collectors.
pub struct Client {
    config: Arc<Config>,
    context_tags: Tags,
    sink: Arc<dyn TelemetrySink>,
}

impl Client {
    pub fn new(config: Config, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            config: Arc::new(config),
            context_tags: Tags::new(),
            sink,
        }
    }

    /// Tags applied to every record unless a call derives its own.
    pub fn with_context_tags(mut self, context_tags: Tags) -> Self {
        self.context_tags = context_tags;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context_tags(&self) -> &Tags {
        &self.context_tags
    }

    /// This process's application id.
    pub fn app_id(&self) -> String {
        self.config.app_id()
    }

    pub fn track(&self, record: Telemetry, tags: Tags, context: CallContext) {
        if self.config.disable_app_insights {
            debug!("Telemetry is disabled, dropping {} record", record.base_type());
            return;
        }
        self.sink.track(record, tags, context);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("context_tags", &self.context_tags)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::dependency::HttpDependencyCall;
    use crate::test_utils::{client, RecordingSink};

    fn record() -> (Telemetry, CallContext) {
        let target = RequestTarget::from("http://bing.com/");
        let request = OutgoingRequest::new("GET");
        let call = HttpDependencyCall::new("", &target, &request);
        let context = CallContext::ClientRequest {
            target,
            request,
            response: None,
            error: None,
        };
        (Telemetry::RemoteDependency(call.get_dependency_data()), context)
    }

    #[test]
    #[serial]
    fn test_track_forwards_to_sink() {
        let sink = Arc::new(RecordingSink::default());
        let client = client(&sink);
        let (telemetry, context) = record();

        client.track(telemetry, Tags::new(), context);

        assert_eq!(
            sink.base_types(),
            vec!["Microsoft.ApplicationInsights.RemoteDependencyData".to_string()]
        );
    }

    #[test]
    #[serial]
    fn test_disabled_client_drops_records() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = Config::new(Some("key")).unwrap();
        config.disable_app_insights = true;
        let client = Client::new(config, sink.clone());
        let (telemetry, context) = record();

        client.track(telemetry, Tags::new(), context);

        assert!(sink.records().is_empty());
    }
}
