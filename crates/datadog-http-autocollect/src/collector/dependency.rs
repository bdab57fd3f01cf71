// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle tracking for outbound calls.

use std::sync::Arc;

use tracing::debug;

use crate::call::{CallEntity, CallError};
use crate::carrier::{header_value, set_header_value};
use crate::client::{CallContext, Client};
use crate::collector::{ambient_tags, emit, Registration};
use crate::contracts::Properties;
use crate::correlation::{CorrelationContext, CorrelationContextManager};
use crate::dependency::HttpDependencyCall;
use crate::error::{AutocollectError, CallKind};
use crate::headers::{APP_ID_KEY, REQUEST_CONTEXT_HEADER, REQUEST_SOURCE_IKEY_HEADER};
use crate::message::{IncomingResponse, OutgoingRequest};
use crate::request_context::{set_request_context, RequestContext};
use crate::url_builder::RequestTarget;

/// Observes calls made by HTTP clients in this process.
#[derive(Debug)]
pub struct HttpDependencyCollector {
    client: Arc<Client>,
    registration: Option<Registration>,
    is_enabled: bool,
    is_initialized: bool,
}

impl HttpDependencyCollector {
    /// Registers the dependency collector for this process.
    pub fn new(client: Arc<Client>) -> Result<Self, AutocollectError> {
        let registration = Registration::acquire(CallKind::Dependency)?;
        Ok(Self {
            client,
            registration: Some(registration),
            is_enabled: false,
            is_initialized: false,
        })
    }

    pub fn enable(&mut self, is_enabled: bool) {
        self.is_enabled = is_enabled;
        if self.is_enabled && !self.is_initialized {
            debug!("Initializing HTTP dependency collection");
            self.is_initialized = true;
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Releases the process-wide registration so a new collector can be built.
    pub fn dispose(&mut self) {
        if self.registration.take().is_some() {
            debug!("Released HTTP dependency collector registration");
        }
        self.is_initialized = false;
    }

    /// Hook for HTTP clients, called once the request is built and before it
    /// is written. Returns `None` when the call is not tracked.
    pub fn before_send(
        &self,
        target: &RequestTarget,
        request: &mut OutgoingRequest,
    ) -> Option<PendingDependency> {
        if !self.is_initialized || !self.is_enabled {
            return None;
        }
        if target.disables_auto_collection() {
            debug!("Auto-collection disabled for this outgoing request");
            return None;
        }
        Some(Self::track_dependency(&self.client, target, request, None))
    }

    /// Starts tracking an outbound call. Must run before the request is sent
    /// since it may add the `Request-Context` and source ikey headers.
    pub fn track_dependency(
        client: &Arc<Client>,
        target: &RequestTarget,
        request: &mut OutgoingRequest,
        properties: Option<Properties>,
    ) -> PendingDependency {
        let entity = HttpDependencyCall::new(client.app_id(), target, request);

        if client.config().can_include_correlation_header(entity.url()) {
            if header_value(request, REQUEST_SOURCE_IKEY_HEADER).is_none() {
                let ikey_hash = client.config().instrumentation_key_hash.clone();
                set_header_value(request, REQUEST_SOURCE_IKEY_HEADER, ikey_hash);
            }
            if header_value(request, REQUEST_CONTEXT_HEADER).is_none() {
                let context =
                    RequestContext::from([(APP_ID_KEY.to_string(), entity.app_id().to_string())]);
                set_request_context(request, &context);
            }
        }

        PendingDependency {
            client: Arc::clone(client),
            target: target.clone(),
            request: request.clone(),
            entity,
            properties,
            context: CorrelationContextManager::current(),
        }
    }
}

/// An outbound call waiting for its response or failure.
#[derive(Debug)]
pub struct PendingDependency {
    client: Arc<Client>,
    target: RequestTarget,
    request: OutgoingRequest,
    entity: HttpDependencyCall,
    properties: Option<Properties>,
    context: Option<Arc<CorrelationContext>>,
}

impl PendingDependency {
    pub fn entity(&self) -> &HttpDependencyCall {
        &self.entity
    }

    pub fn on_response(self, response: &IncomingResponse) -> Result<(), AutocollectError> {
        let Self {
            client,
            target,
            request,
            mut entity,
            properties,
            context,
        } = self;
        entity.on_response(response, properties)?;

        let call_context = CallContext::ClientRequest {
            target,
            request,
            response: Some(response.clone()),
            error: None,
        };
        end_dependency(&client, &entity, context, call_context);
        Ok(())
    }

    pub fn on_error(self, error: CallError) -> Result<(), AutocollectError> {
        let Self {
            client,
            target,
            request,
            mut entity,
            properties,
            context,
        } = self;
        entity.on_error(error.clone(), properties)?;

        let call_context = CallContext::ClientRequest {
            target,
            request,
            response: None,
            error: Some(error),
        };
        end_dependency(&client, &entity, context, call_context);
        Ok(())
    }
}

fn end_dependency(
    client: &Client,
    entity: &HttpDependencyCall,
    context: Option<Arc<CorrelationContext>>,
    call_context: CallContext,
) {
    let ambient = CorrelationContextManager::run_with_context_sync(context, || {
        ambient_tags(client, true)
    });
    debug!(
        "Tracking dependency {} {} with status {:?}",
        entity.method(),
        entity.url(),
        entity.status_code()
    );
    emit(client, entity, &ambient, call_context);
}
