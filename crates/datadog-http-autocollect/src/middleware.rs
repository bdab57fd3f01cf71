// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tower middleware driving the collectors from an HTTP stack.
//!
//! [`RequestTelemetryLayer`] wraps a server's service and
//! [`DependencyTelemetryLayer`] wraps a client's. Both only look at the
//! `http` request and response types, so they sit in front of hyper or any
//! other tower-compatible stack. Inbound responses are handed back wrapped in a
//! [`TrackedBody`], and the request record is emitted when that body ends.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use datadog_http_autocollect::client::{CallContext, Client, TelemetrySink};
//! use datadog_http_autocollect::collector::request::HttpRequestCollector;
//! use datadog_http_autocollect::config::Config;
//! use datadog_http_autocollect::contracts::{Tags, Telemetry};
//! use datadog_http_autocollect::middleware::RequestTelemetryLayer;
//! use http_body_util::Full;
//! use hyper::body::Bytes;
//! use tower::ServiceBuilder;
//!
//! struct Stdout;
//!
//! impl TelemetrySink for Stdout {
//!     fn track(&self, record: Telemetry, _tags: Tags, _context: CallContext) {
//!         println!("{}", record.base_type());
//!     }
//! }
//!
//! let client = Arc::new(Client::new(Config::from_env()?, Arc::new(Stdout)));
//! let mut collector = HttpRequestCollector::new(client)?;
//! collector.use_auto_correlation(true);
//! collector.enable(true);
//!
//! let service = ServiceBuilder::new()
//!     .layer(RequestTelemetryLayer::new(Arc::new(collector)))
//!     .service_fn(|_request: hyper::http::Request<()>| async {
//!         let body = Full::new(Bytes::from_static(b"ok"));
//!         Ok::<_, std::convert::Infallible>(hyper::http::Response::new(body))
//!     });
//! # Ok::<(), datadog_http_autocollect::error::AutocollectError>(())
//! ```

use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::body::{Body, Frame, SizeHint};
use hyper::http::{header::HOST, HeaderMap, Request, Response, Uri};
use tower::{Layer, Service};
use tracing::debug;

use crate::call::CallError;
use crate::carrier::Injector;
use crate::collector::dependency::HttpDependencyCollector;
use crate::collector::request::{HttpRequestCollector, PendingRequest, RequestObservation};
use crate::correlation::CorrelationContextManager;
use crate::headers::{APP_ID_KEY, REQUEST_CONTEXT_HEADER, REQUEST_SOURCE_IKEY_HEADER};
use crate::message::{IncomingRequest, IncomingResponse, OutgoingRequest, ServerResponse};
use crate::request_context::{encode, RequestContext};
use crate::url_builder::{RequestOptions, RequestTarget};

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Request extension describing the connection a request travels over: the
/// one it arrived on for inbound requests, the one it is sent through for
/// outbound calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportInfo {
    pub encrypted: bool,
}

impl TransportInfo {
    pub fn protocol(&self) -> &'static str {
        if self.encrypted {
            "https:"
        } else {
            "http:"
        }
    }
}

/// Request extension opting an outbound call out of dependency tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisableAutoCollection;

#[derive(Debug, Clone)]
pub struct RequestTelemetryLayer {
    collector: Arc<HttpRequestCollector>,
}

impl RequestTelemetryLayer {
    pub fn new(collector: Arc<HttpRequestCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for RequestTelemetryLayer {
    type Service = RequestTelemetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTelemetryService {
            inner,
            collector: Arc::clone(&self.collector),
        }
    }
}

/// Tracks every request handled by the inner service and runs the handler
/// under the request's correlation context.
///
/// The record is emitted once the response body has been fully sent, fails,
/// or is dropped, see [`TrackedBody`].
#[derive(Debug, Clone)]
pub struct RequestTelemetryService<S> {
    inner: S,
    collector: Arc<HttpRequestCollector>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestTelemetryService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
    ReqBody: 'static,
    ResBody: Body + Send + 'static,
    ResBody::Error: Display,
{
    type Response = Response<TrackedBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let RequestObservation { context, pending } =
            self.collector.begin(&incoming_request(&request));
        let include_header = pending.as_ref().is_some_and(|pending| {
            self.collector
                .client()
                .config()
                .can_include_correlation_header(pending.entity().url())
        });

        // Services that read the context inside `call` see it as well.
        let future = CorrelationContextManager::run_with_context_sync(context.clone(), || {
            self.inner.call(request)
        });

        Box::pin(CorrelationContextManager::run_with_context(context, async move {
            let result = future.await;
            let Some(pending) = pending else {
                return result.map(|response| response.map(TrackedBody::untracked));
            };

            match result {
                Ok(mut response) => {
                    // Headers go out before the body, so they are stamped now.
                    if include_header {
                        let context = RequestContext::from([(
                            APP_ID_KEY.to_string(),
                            pending.entity().app_id().to_string(),
                        )]);
                        response
                            .headers_mut()
                            .set(REQUEST_CONTEXT_HEADER, encode(&context));
                    }
                    let snapshot = ServerResponse {
                        status_code: Some(response.status().as_u16()),
                        headers: response.headers().clone(),
                    };
                    Ok(response.map(|body| TrackedBody::new(body, pending, snapshot)))
                }
                Err(e) => {
                    let error = CallError::Error(e.to_string());
                    if let Err(e) = pending.fail(&mut ServerResponse::default(), error) {
                        debug!("Failed to track request: {e}");
                    }
                    Err(e)
                }
            }
        }))
    }
}

/// Response body that completes its request's record when the body ends.
///
/// Reaching the end of the stream finishes the request. A body error, or
/// dropping the body before its end, fails it.
pub struct TrackedBody<B: Body> {
    inner: Pin<Box<B>>,
    completion: Option<(PendingRequest, ServerResponse)>,
}

impl<B: Body> TrackedBody<B> {
    fn new(inner: B, pending: PendingRequest, response: ServerResponse) -> Self {
        Self {
            inner: Box::pin(inner),
            completion: Some((pending, response)),
        }
    }

    fn untracked(inner: B) -> Self {
        Self {
            inner: Box::pin(inner),
            completion: None,
        }
    }

    fn complete(&mut self, error: Option<CallError>) {
        let Some((pending, mut response)) = self.completion.take() else {
            return;
        };
        let outcome = match error {
            None => pending.finish(&mut response),
            Some(error) => pending.fail(&mut response, error),
        };
        if let Err(e) = outcome {
            debug!("Failed to track request: {e}");
        }
    }
}

impl<B> Body for TrackedBody<B>
where
    B: Body,
    B::Error: Display,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_frame(cx);
        match &polled {
            Poll::Ready(None) => this.complete(None),
            Poll::Ready(Some(Err(e))) => this.complete(Some(CallError::Error(e.to_string()))),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.complete(None),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: Body> Drop for TrackedBody<B> {
    fn drop(&mut self) {
        if self.completion.is_none() {
            return;
        }
        if self.inner.is_end_stream() {
            self.complete(None);
        } else {
            self.complete(Some(CallError::from("response body dropped before completion")));
        }
    }
}

impl<B: Body> std::fmt::Debug for TrackedBody<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedBody")
            .field("pending", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct DependencyTelemetryLayer {
    collector: Arc<HttpDependencyCollector>,
}

impl DependencyTelemetryLayer {
    pub fn new(collector: Arc<HttpDependencyCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for DependencyTelemetryLayer {
    type Service = DependencyTelemetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DependencyTelemetryService {
            inner,
            collector: Arc::clone(&self.collector),
        }
    }
}

/// Tracks every call sent through the inner client service.
#[derive(Debug, Clone)]
pub struct DependencyTelemetryService<S> {
    inner: S,
    collector: Arc<HttpDependencyCollector>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DependencyTelemetryService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
    ReqBody: 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let pending = if request.extensions().get::<DisableAutoCollection>().is_some() {
            None
        } else {
            let target = request_target(request.uri(), request.headers());
            let agent_protocol = match request.uri().scheme_str() {
                Some(scheme) => Some(format!("{scheme}:")),
                None => request
                    .extensions()
                    .get::<TransportInfo>()
                    .map(|transport| transport.protocol().to_string()),
            };
            let mut outgoing = OutgoingRequest {
                method: request.method().as_str().to_string(),
                headers: request.headers().clone(),
                agent_protocol,
            };
            let pending = self.collector.before_send(&target, &mut outgoing);
            if pending.is_some() {
                for name in [REQUEST_CONTEXT_HEADER, REQUEST_SOURCE_IKEY_HEADER] {
                    copy_header(&outgoing.headers, request.headers_mut(), name);
                }
            }
            pending
        };

        let future = self.inner.call(request);
        Box::pin(async move {
            let result = future.await;
            let Some(pending) = pending else {
                return result;
            };

            let outcome = match &result {
                Ok(response) => pending.on_response(&IncomingResponse {
                    status_code: response.status().as_u16(),
                    headers: response.headers().clone(),
                }),
                Err(e) => pending.on_error(CallError::Error(e.to_string())),
            };
            if let Err(e) = outcome {
                debug!("Failed to track dependency: {e}");
            }
            result
        })
    }
}

fn incoming_request<B>(request: &Request<B>) -> IncomingRequest {
    let mut headers = request.headers().clone();
    if !headers.contains_key(HOST) {
        if let Some(authority) = request.uri().authority() {
            if let Ok(value) = authority.as_str().parse() {
                headers.insert(HOST, value);
            }
        }
    }

    let encrypted = match request.extensions().get::<TransportInfo>() {
        Some(transport) => transport.encrypted,
        None => request.uri().scheme_str() == Some("https"),
    };

    IncomingRequest {
        method: request.method().as_str().to_string(),
        url: request
            .uri()
            .path_and_query()
            .map_or_else(|| "/".to_string(), |path| path.as_str().to_string()),
        headers,
        remote_address: request
            .extensions()
            .get::<SocketAddr>()
            .map(|address| address.ip().to_string()),
        encrypted,
    }
}

/// Absolute request URIs are used as-is, origin-form ones are resolved
/// against the `Host` header.
fn request_target(uri: &Uri, headers: &HeaderMap) -> RequestTarget {
    if uri.authority().is_some() {
        return RequestTarget::Url(uri.to_string());
    }
    RequestTarget::Options(RequestOptions {
        host: headers
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .map(str::to_string),
        path: uri.path_and_query().map(|path| path.as_str().to_string()),
        ..Default::default()
    })
}

fn copy_header(from: &HeaderMap, to: &mut HeaderMap, name: &str) {
    if let Some(value) = from.get(name) {
        if let Ok(name) = hyper::http::header::HeaderName::from_bytes(name.as_bytes()) {
            to.insert(name, value.clone());
        }
    }
}
