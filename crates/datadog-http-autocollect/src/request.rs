// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound request entity.

use std::time::SystemTime;

use hyper::http::HeaderMap;
use uuid::Uuid;

use crate::call::{CallEntity, CallError, CallState, CallTiming};
use crate::carrier::{header_value, Extractor, HttpMessage};
use crate::contracts::{
    context_tag_keys, ms_to_time_span, Data, Properties, RequestData, Tags, Telemetry,
    REQUEST_DATA_TYPE,
};
use crate::error::AutocollectError;
use crate::headers::{
    APP_ID_KEY, HOST_HEADER, REQUEST_ID_HEADER, REQUEST_ROOT_ID_HEADER, USER_AGENT_HEADER,
};
use crate::identity::{client_ip, session_id, user_id};
use crate::message::{IncomingRequest, ServerResponse};
use crate::request_context::{get_request_context, set_request_context, RequestContext};
use crate::url_builder::{absolute_url, pathname};

/// Status reported when an inbound call ends without one.
const DEFAULT_FAILURE_STATUS: u16 = 500;

/// Everything observed about one request handled by this process.
#[derive(Debug, Clone)]
pub struct HttpRequestCall {
    app_id: String,
    request_id: String,
    timing: CallTiming,
    method: String,
    url: String,
    headers: HeaderMap,
    socket_remote_address: Option<String>,
    user_agent: Option<String>,
    status_code: Option<u16>,
    properties: Properties,
    their_app_id: String,
    parent_id: String,
    operation_id: String,
}

impl HttpRequestCall {
    /// Captures an inbound request at the time it is received.
    ///
    /// `app_id` is this process's own application id. A missing `request_id`
    /// is replaced by a fresh one.
    pub fn new(app_id: impl Into<String>, request: &IncomingRequest, request_id: Option<String>) -> Self {
        let header = |name: &str| header_value(request, name).map(str::to_string);
        let their_app_id = get_request_context(request)
            .remove(APP_ID_KEY)
            .unwrap_or_default();

        Self {
            app_id: app_id.into(),
            request_id: request_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timing: CallTiming::start(),
            method: request.method.clone(),
            url: absolute_url(
                &request.url,
                header_value(request, HOST_HEADER),
                request.encrypted,
            ),
            headers: request.headers.clone(),
            socket_remote_address: request.remote_address.clone(),
            user_agent: header(USER_AGENT_HEADER),
            status_code: None,
            properties: Properties::new(),
            their_app_id,
            parent_id: header(REQUEST_ID_HEADER).unwrap_or_default(),
            operation_id: header(REQUEST_ROOT_ID_HEADER).unwrap_or_default(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Absolute URL of the request, query string included.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn start_time(&self) -> SystemTime {
        self.timing.start_time()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.timing.duration_ms()
    }

    /// Overrides the measured duration with one taken at a higher layer.
    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.timing.set_duration_ms(duration_ms);
    }

    pub fn state(&self) -> CallState {
        self.timing.state()
    }

    /// Records the response and stamps our application id on it.
    pub fn on_response(
        &mut self,
        response: &mut ServerResponse,
        properties: Option<Properties>,
    ) -> Result<(), AutocollectError> {
        self.set_status(response.status_code, CallState::Completed, None, properties)?;
        let context = RequestContext::from([(APP_ID_KEY.to_string(), self.app_id.clone())]);
        set_request_context(response, &context);
        Ok(())
    }

    /// Records a failed request. The status is taken from `response` when
    /// it carries one, otherwise it is 500.
    pub fn on_error(
        &mut self,
        error: CallError,
        response: Option<&ServerResponse>,
        properties: Option<Properties>,
    ) -> Result<(), AutocollectError> {
        let status_code = response.and_then(|response| response.status_code);
        self.set_status(status_code, CallState::Failed, Some(error), properties)
    }

    fn set_status(
        &mut self,
        status_code: Option<u16>,
        end_state: CallState,
        error: Option<CallError>,
        properties: Option<Properties>,
    ) -> Result<(), AutocollectError> {
        self.timing.finish(end_state)?;
        self.status_code = Some(
            status_code
                .filter(|code| *code != 0)
                .unwrap_or(DEFAULT_FAILURE_STATUS),
        );
        self.properties = properties.unwrap_or_default();
        if let Some(error) = error {
            error.record_into(&mut self.properties);
        }
        Ok(())
    }

    /// `"{METHOD} {path}"`.
    fn name(&self) -> String {
        format!("{} {}", self.method, pathname(&self.url))
    }

    pub fn get_request_data(&self) -> Data<RequestData> {
        Data {
            base_type: REQUEST_DATA_TYPE.to_string(),
            base_data: RequestData {
                id: self.request_id.clone(),
                name: self.name(),
                url: self.url.clone(),
                source: self.their_app_id.clone(),
                duration: ms_to_time_span(self.timing.duration_ms().unwrap_or_default()),
                response_code: self.status_code.map(|code| code.to_string()),
                success: self.is_success(),
                properties: self.properties.clone(),
            },
        }
    }

    /// Context tags for this request.
    ///
    /// Starts from a copy of `tags` and fills in client location, session,
    /// user and operation tags. Non-empty values already in `tags` are never
    /// overwritten.
    pub fn get_request_tags(&self, tags: &Tags) -> Tags {
        let mut request_tags = tags.clone();

        let derived = [
            (
                context_tag_keys::LOCATION_IP,
                client_ip(self, self.socket_remote_address.as_deref()),
            ),
            (context_tag_keys::SESSION_ID, session_id(self)),
            (context_tag_keys::USER_ID, user_id(self)),
            (context_tag_keys::USER_AGENT, self.user_agent.clone()),
            (context_tag_keys::OPERATION_NAME, Some(self.get_operation_name(tags))),
            (context_tag_keys::OPERATION_PARENT_ID, self.get_operation_parent_id(tags)),
            (context_tag_keys::OPERATION_ID, self.get_operation_id(tags)),
        ];
        for (key, value) in derived {
            if let Some(value) = first_present([ambient(tags, key), value]) {
                request_tags.insert(key.to_string(), value);
            }
        }
        request_tags
    }

    /// Operation id from `tags`, else from the root-id header.
    pub fn get_operation_id(&self, tags: &Tags) -> Option<String> {
        first_present([
            ambient(tags, context_tag_keys::OPERATION_ID),
            Some(self.operation_id.clone()),
        ])
    }

    /// Parent id from `tags`, else the request-id header, else the operation id.
    pub fn get_operation_parent_id(&self, tags: &Tags) -> Option<String> {
        first_present([
            ambient(tags, context_tag_keys::OPERATION_PARENT_ID),
            Some(self.parent_id.clone()),
            self.get_operation_id(tags),
        ])
    }

    /// Operation name from `tags`, else `"{METHOD} {path}"`.
    pub fn get_operation_name(&self, tags: &Tags) -> String {
        ambient(tags, context_tag_keys::OPERATION_NAME).unwrap_or_else(|| self.name())
    }
}

fn ambient(tags: &Tags, key: &str) -> Option<String> {
    tags.get(key).filter(|value| !value.is_empty()).cloned()
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
}

impl HttpMessage for HttpRequestCall {
    fn header_accessor(&self) -> Option<&dyn Extractor> {
        Some(&self.headers)
    }
}

impl CallEntity for HttpRequestCall {
    fn timing(&self) -> &CallTiming {
        &self.timing
    }

    fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn their_app_id(&self) -> &str {
        &self.their_app_id
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::Request(self.get_request_data())
    }

    fn tags(&self, ambient: &Tags) -> Tags {
        self.get_request_tags(ambient)
    }
}
