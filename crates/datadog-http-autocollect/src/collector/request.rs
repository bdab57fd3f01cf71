// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle tracking for inbound requests.

use std::sync::Arc;

use tracing::debug;

use crate::call::{CallEntity, CallError};
use crate::client::{CallContext, Client};
use crate::collector::{ambient_tags, emit, Registration};
use crate::contracts::Properties;
use crate::correlation::{CorrelationContext, CorrelationContextManager};
use crate::error::{AutocollectError, CallKind};
use crate::headers::APP_ID_KEY;
use crate::message::{IncomingRequest, ServerResponse};
use crate::request::HttpRequestCall;
use crate::request_context::{set_request_context, RequestContext};

/// Observes requests received by servers in this process.
///
/// Collection and auto-correlation are switched independently. With
/// auto-correlation on and collection off, every request still gets a
/// correlation context but no record is emitted.
#[derive(Debug)]
pub struct HttpRequestCollector {
    client: Arc<Client>,
    registration: Option<Registration>,
    is_enabled: bool,
    is_initialized: bool,
    is_auto_correlating: bool,
}

/// What [`HttpRequestCollector::begin`] set up for one request.
#[derive(Debug, Default)]
pub struct RequestObservation {
    /// Context to run the request handler under.
    pub context: Option<Arc<CorrelationContext>>,
    /// Present when collection is enabled.
    pub pending: Option<PendingRequest>,
}

impl HttpRequestCollector {
    /// Registers the request collector for this process.
    pub fn new(client: Arc<Client>) -> Result<Self, AutocollectError> {
        let registration = Registration::acquire(CallKind::Request)?;
        Ok(Self {
            client,
            registration: Some(registration),
            is_enabled: false,
            is_initialized: false,
            is_auto_correlating: false,
        })
    }

    pub fn enable(&mut self, is_enabled: bool) {
        self.is_enabled = is_enabled;
        if (self.is_auto_correlating || self.is_enabled) && !self.is_initialized {
            debug!("Initializing HTTP request collection");
            self.is_initialized = true;
        }
    }

    pub fn use_auto_correlation(&mut self, is_enabled: bool) {
        self.is_auto_correlating = is_enabled;
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn is_auto_correlating(&self) -> bool {
        self.is_auto_correlating
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Releases the process-wide registration so a new collector can be built.
    pub fn dispose(&mut self) {
        if self.registration.take().is_some() {
            debug!("Released HTTP request collector registration");
        }
        self.is_initialized = false;
    }

    /// Starts observing `request` as the server receives it.
    pub fn begin(&self, request: &IncomingRequest) -> RequestObservation {
        if !self.is_initialized {
            return RequestObservation::default();
        }

        let entity = HttpRequestCall::new(self.client.app_id(), request, None);
        let tags = self.client.context_tags();
        let context = self.is_auto_correlating.then(|| {
            CorrelationContextManager::generate_context_object(
                Some(entity.request_id()),
                &entity.get_operation_name(tags),
                entity.get_operation_id(tags).as_deref(),
            )
        });

        let pending = self.is_enabled.then(|| {
            PendingRequest::new(
                Arc::clone(&self.client),
                request,
                entity,
                None,
                context.clone(),
            )
        });

        RequestObservation { context, pending }
    }

    /// Starts tracking a request explicitly. The request id comes from the
    /// ambient correlation context when there is one.
    pub fn track_request(
        client: &Arc<Client>,
        request: &IncomingRequest,
        response: &mut ServerResponse,
        properties: Option<Properties>,
    ) -> PendingRequest {
        let context = CorrelationContextManager::current();
        let request_id = context
            .as_ref()
            .map(|context| context.operation().parent_id);
        let entity = HttpRequestCall::new(client.app_id(), request, request_id);

        if client.config().can_include_correlation_header(entity.url()) {
            stamp_app_id(response, entity.app_id());
        }

        PendingRequest::new(Arc::clone(client), request, entity, properties, context)
    }

    /// Tracks a request whose response is already complete and emits the
    /// record immediately. The ambient correlation context, if any, is
    /// overwritten with this request's operation.
    pub fn track_request_sync(
        client: &Client,
        request: &IncomingRequest,
        response: &mut ServerResponse,
        elapsed_ms: Option<u64>,
        properties: Option<Properties>,
        error: Option<CallError>,
    ) -> Result<(), AutocollectError> {
        stamp_app_id(response, &client.app_id());

        let context = CorrelationContextManager::current();
        let request_id = context
            .as_ref()
            .map(|context| context.operation().parent_id);
        let entity = HttpRequestCall::new(client.app_id(), request, request_id);

        if let Some(context) = &context {
            let tags = client.context_tags();
            context.update(|operation| {
                if let Some(id) = entity.get_operation_id(tags) {
                    operation.id = id;
                }
                operation.name = entity.get_operation_name(tags);
                operation.parent_id = entity.request_id().to_string();
            });
        }

        end_request(
            client,
            entity,
            request,
            response,
            elapsed_ms,
            properties,
            error,
            context,
        )
    }
}

/// A request being tracked, waiting for its response to finish.
///
/// Consuming `self` on completion guarantees a single record per request.
#[derive(Debug)]
pub struct PendingRequest {
    client: Arc<Client>,
    request: IncomingRequest,
    entity: HttpRequestCall,
    properties: Option<Properties>,
    context: Option<Arc<CorrelationContext>>,
}

impl PendingRequest {
    fn new(
        client: Arc<Client>,
        request: &IncomingRequest,
        entity: HttpRequestCall,
        properties: Option<Properties>,
        context: Option<Arc<CorrelationContext>>,
    ) -> Self {
        Self {
            client,
            request: request.clone(),
            entity,
            properties,
            context,
        }
    }

    pub fn entity(&self) -> &HttpRequestCall {
        &self.entity
    }

    /// The response finished; stamps our application id on it and emits.
    pub fn finish(self, response: &mut ServerResponse) -> Result<(), AutocollectError> {
        self.end(response, None)
    }

    /// The request failed before a response could be produced.
    pub fn fail(self, response: &mut ServerResponse, error: CallError) -> Result<(), AutocollectError> {
        self.end(response, Some(error))
    }

    fn end(self, response: &mut ServerResponse, error: Option<CallError>) -> Result<(), AutocollectError> {
        end_request(
            &self.client,
            self.entity,
            &self.request,
            response,
            None,
            self.properties,
            error,
            self.context,
        )
    }
}

fn stamp_app_id(response: &mut ServerResponse, app_id: &str) {
    let context = RequestContext::from([(APP_ID_KEY.to_string(), app_id.to_string())]);
    set_request_context(response, &context);
}

#[allow(clippy::too_many_arguments)]
fn end_request(
    client: &Client,
    mut entity: HttpRequestCall,
    request: &IncomingRequest,
    response: &mut ServerResponse,
    elapsed_ms: Option<u64>,
    properties: Option<Properties>,
    error: Option<CallError>,
    context: Option<Arc<CorrelationContext>>,
) -> Result<(), AutocollectError> {
    match &error {
        Some(error) => entity.on_error(error.clone(), Some(response), properties)?,
        None => entity.on_response(response, properties)?,
    }
    if let Some(elapsed_ms) = elapsed_ms.filter(|elapsed| *elapsed > 0) {
        entity.set_duration_ms(elapsed_ms);
    }

    let ambient = CorrelationContextManager::run_with_context_sync(context, || {
        ambient_tags(client, false)
    });
    debug!(
        "Tracking request {} {} with status {:?}",
        entity.method(),
        entity.url(),
        entity.status_code()
    );
    let call_context = CallContext::ServerRequest {
        request: request.clone(),
        response: response.clone(),
        error,
    };
    emit(client, &entity, &ambient, call_context);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::carrier::{Extractor, Injector};
    use crate::contracts::{context_tag_keys, Telemetry};
    use crate::correlation::Operation;
    use crate::test_utils::{client, RecordingSink};

    fn incoming() -> IncomingRequest {
        let mut request = IncomingRequest::new("GET", "/search?q=test");
        request.headers.set("host", "bing.com".to_string());
        request.headers.set("x-ms-request-root-id", "rootId".to_string());
        request
    }

    #[test]
    #[serial]
    fn test_second_collector_fails_until_disposed() {
        let sink = Arc::new(RecordingSink::default());
        let mut first = HttpRequestCollector::new(client(&sink)).unwrap();

        assert!(matches!(
            HttpRequestCollector::new(client(&sink)),
            Err(AutocollectError::CollectorAlreadyRegistered(CallKind::Request))
        ));

        first.dispose();
        assert!(HttpRequestCollector::new(client(&sink)).is_ok());
    }

    #[test]
    #[serial]
    fn test_enable_initializes() {
        let sink = Arc::new(RecordingSink::default());
        let mut collector = HttpRequestCollector::new(client(&sink)).unwrap();
        assert!(!collector.is_initialized());

        collector.enable(true);

        assert!(collector.is_initialized());
        assert!(!collector.is_auto_correlating());
    }

    #[test]
    #[serial]
    fn test_uninitialized_collector_observes_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let collector = HttpRequestCollector::new(client(&sink)).unwrap();

        let observation = collector.begin(&incoming());

        assert!(observation.context.is_none());
        assert!(observation.pending.is_none());
    }

    #[test]
    #[serial]
    fn test_auto_correlation_without_collection() {
        let sink = Arc::new(RecordingSink::default());
        let mut collector = HttpRequestCollector::new(client(&sink)).unwrap();
        collector.use_auto_correlation(true);
        collector.enable(false);

        let observation = collector.begin(&incoming());

        assert!(collector.is_initialized());
        assert!(observation.pending.is_none());
        let operation = observation.context.unwrap().operation();
        assert_eq!(operation.id, "rootId");
        assert_eq!(operation.name, "GET /search");
    }

    #[test]
    #[serial]
    fn test_begin_then_finish_emits_once() {
        let sink = Arc::new(RecordingSink::default());
        let mut collector = HttpRequestCollector::new(client(&sink)).unwrap();
        collector.use_auto_correlation(true);
        collector.enable(true);

        let observation = collector.begin(&incoming());
        let context = observation.context.unwrap();
        let mut response = ServerResponse::with_status(200);
        observation.pending.unwrap().finish(&mut response).unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let (record, tags) = &records[0];
        match record {
            Telemetry::Request(data) => {
                assert_eq!(data.base_data.url, "http://bing.com/search?q=test");
                assert_eq!(data.base_data.id, context.operation().parent_id);
                assert!(data.base_data.success);
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(tags[context_tag_keys::OPERATION_ID], "rootId");
        assert_eq!(tags[context_tag_keys::OPERATION_PARENT_ID], "rootId");
        assert_eq!(
            Extractor::get(&response.headers, "request-context"),
            Some("appId=")
        );
    }

    #[test]
    #[serial]
    fn test_fail_reports_500() {
        let sink = Arc::new(RecordingSink::default());
        let pending = HttpRequestCollector::track_request(
            &client(&sink),
            &incoming(),
            &mut ServerResponse::default(),
            None,
        );

        pending
            .fail(&mut ServerResponse::default(), CallError::from("aborted"))
            .unwrap();

        let records = sink.records();
        match &records[0].0 {
            Telemetry::Request(data) => {
                assert_eq!(data.base_data.response_code.as_deref(), Some("500"));
                assert_eq!(data.base_data.properties["error"], "aborted");
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_track_request_uses_ambient_parent_as_id() {
        let sink = Arc::new(RecordingSink::default());
        let client = client(&sink);
        let context = Arc::new(CorrelationContext::new(Operation {
            id: "op".to_string(),
            name: "outer".to_string(),
            parent_id: "ambientParent".to_string(),
        }));

        let pending = CorrelationContextManager::run_with_context_sync(Some(context), || {
            HttpRequestCollector::track_request(
                &client,
                &incoming(),
                &mut ServerResponse::default(),
                None,
            )
        });

        assert_eq!(pending.entity().request_id(), "ambientParent");
    }

    #[test]
    #[serial]
    fn test_track_request_sync_overwrites_context() {
        let sink = Arc::new(RecordingSink::default());
        let client = client(&sink);
        let context = CorrelationContextManager::generate_context_object(None, "outer", None);
        let mut response = ServerResponse::with_status(204);

        CorrelationContextManager::run_with_context_sync(Some(context.clone()), || {
            HttpRequestCollector::track_request_sync(
                &client,
                &incoming(),
                &mut response,
                Some(1_500),
                None,
                None,
            )
        })
        .unwrap();

        let operation = context.operation();
        assert_eq!(operation.id, "rootId");
        assert_eq!(operation.name, "GET /search");

        let records = sink.records();
        match &records[0].0 {
            Telemetry::Request(data) => {
                assert_eq!(data.base_data.duration, "00:00:01.500");
                assert_eq!(data.base_data.id, operation.parent_id);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
