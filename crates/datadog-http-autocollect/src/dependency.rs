// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outbound dependency entity.

use std::time::SystemTime;

use crate::call::{CallEntity, CallError, CallState, CallTiming};
use crate::contracts::{
    ms_to_time_span, Data, Properties, RemoteDependencyData, Tags, Telemetry,
    DEPENDENCY_TYPE_HTTP, DEPENDENCY_TYPE_HTTP_TRACKED, REMOTE_DEPENDENCY_DATA_TYPE,
};
use crate::error::AutocollectError;
use crate::headers::APP_ID_KEY;
use crate::message::{IncomingResponse, OutgoingRequest};
use crate::request_context::get_request_context;
use crate::url_builder::{hostname, pathname, url_from_request_options, RequestTarget};

const DEFAULT_METHOD: &str = "GET";

/// Everything observed about one call made by this process.
#[derive(Debug, Clone)]
pub struct HttpDependencyCall {
    app_id: String,
    timing: CallTiming,
    method: String,
    url: String,
    status_code: Option<u16>,
    properties: Properties,
    their_app_id: String,
}

impl HttpDependencyCall {
    /// Captures an outbound call as it is about to be sent to `target`.
    pub fn new(app_id: impl Into<String>, target: &RequestTarget, request: &OutgoingRequest) -> Self {
        let method = if request.method.is_empty() {
            DEFAULT_METHOD.to_string()
        } else {
            request.method.clone()
        };

        Self {
            app_id: app_id.into(),
            timing: CallTiming::start(),
            method,
            url: url_from_request_options(target, request.agent_protocol.as_deref()),
            status_code: None,
            properties: Properties::new(),
            their_app_id: String::new(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Reconstructed absolute URL, query string included.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn start_time(&self) -> SystemTime {
        self.timing.start_time()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.timing.duration_ms()
    }

    pub fn state(&self) -> CallState {
        self.timing.state()
    }

    /// Records the response and learns the callee's application id from it.
    pub fn on_response(
        &mut self,
        response: &IncomingResponse,
        properties: Option<Properties>,
    ) -> Result<(), AutocollectError> {
        self.timing.finish(CallState::Completed)?;
        if let Some(properties) = properties {
            self.properties = properties;
        }
        self.status_code = Some(response.status_code);
        self.their_app_id = get_request_context(response)
            .remove(APP_ID_KEY)
            .unwrap_or_default();
        Ok(())
    }

    /// Records a failed call. No status code is set.
    pub fn on_error(
        &mut self,
        error: CallError,
        properties: Option<Properties>,
    ) -> Result<(), AutocollectError> {
        self.timing.finish(CallState::Failed)?;
        if let Some(properties) = properties {
            self.properties = properties;
        }
        error.record_into(&mut self.properties);
        Ok(())
    }

    pub fn get_dependency_data(&self) -> Data<RemoteDependencyData> {
        let host = hostname(&self.url);
        let (dependency_type, target) = if self.their_app_id.is_empty() {
            (DEPENDENCY_TYPE_HTTP, host)
        } else {
            (
                DEPENDENCY_TYPE_HTTP_TRACKED,
                format!("{host} | {}", self.their_app_id),
            )
        };

        Data {
            base_type: REMOTE_DEPENDENCY_DATA_TYPE.to_string(),
            base_data: RemoteDependencyData {
                name: format!("{} {}", self.method.to_uppercase(), pathname(&self.url)),
                dependency_type: dependency_type.to_string(),
                target,
                data: self.url.clone(),
                duration: ms_to_time_span(self.timing.duration_ms().unwrap_or_default()),
                result_code: self
                    .status_code
                    .filter(|code| *code != 0)
                    .map(|code| code.to_string()),
                success: self.is_success(),
                properties: self.properties.clone(),
            },
        }
    }
}

impl CallEntity for HttpDependencyCall {
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
        Telemetry::RemoteDependency(self.get_dependency_data())
    }

    fn tags(&self, ambient: &Tags) -> Tags {
        ambient.clone()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::carrier::Injector;
    use crate::url_builder::RequestOptions;

    fn dependency(url: &str) -> HttpDependencyCall {
        HttpDependencyCall::new("myApp", &RequestTarget::from(url), &OutgoingRequest::new("GET"))
    }

    fn completed(url: &str, status_code: u16) -> HttpDependencyCall {
        let mut call = dependency(url);
        call.on_response(&IncomingResponse::new(status_code), None).unwrap();
        call
    }

    #[test]
    fn test_url_from_options() {
        let target = RequestTarget::Options(RequestOptions {
            host: Some("bing.com".to_string()),
            port: Some(8000),
            path: Some("/search?q=test".to_string()),
            ..Default::default()
        });
        let mut request = OutgoingRequest::new("get");
        request.agent_protocol = Some("http:".to_string());

        let call = HttpDependencyCall::new("", &target, &request);

        assert_eq!(call.url(), "http://bing.com:8000/search?q=test");
    }

    #[test]
    fn test_method_defaults_to_get() {
        let call = HttpDependencyCall::new(
            "",
            &RequestTarget::from("http://bing.com/"),
            &OutgoingRequest::default(),
        );
        assert_eq!(call.method(), "GET");
    }

    #[test]
    fn test_name_strips_query_and_fragment() {
        let mut call = HttpDependencyCall::new(
            "",
            &RequestTarget::from("http://bing.com/search?q=test#top"),
            &OutgoingRequest::new("post"),
        );
        call.on_response(&IncomingResponse::new(200), None).unwrap();

        let data = call.get_dependency_data().base_data;
        assert_eq!(data.name, "POST /search");
        assert_eq!(data.data, "http://bing.com/search?q=test#top");
        assert_eq!(data.target, "bing.com");
        assert_eq!(data.dependency_type, DEPENDENCY_TYPE_HTTP);
    }

    #[test]
    fn test_success_boundary() {
        assert!(completed("http://bing.com/", 399).get_dependency_data().base_data.success);
        assert!(!completed("http://bing.com/", 400).get_dependency_data().base_data.success);
    }

    #[test]
    fn test_error_leaves_status_unset() {
        let mut call = dependency("http://bing.com/search");
        let error = std::io::Error::new(std::io::ErrorKind::Other, "test error message");

        call.on_error(CallError::from_error(&error), None).unwrap();

        let data = call.get_dependency_data().base_data;
        assert!(!data.success);
        assert_eq!(data.result_code, None);
        assert_eq!(data.properties.get("error").unwrap(), "test error message");
        assert_eq!(call.status_code(), None);
    }

    #[test]
    fn test_tracked_component() {
        let mut call = dependency("http://bing.com/search");
        let mut response = IncomingResponse::new(200);
        response.headers.set("request-context", "appId=theirApp".to_string());

        call.on_response(&response, None).unwrap();

        let data = call.get_dependency_data().base_data;
        assert_eq!(data.dependency_type, DEPENDENCY_TYPE_HTTP_TRACKED);
        assert_eq!(data.target, "bing.com | theirApp");
        assert_eq!(CallEntity::their_app_id(&call), "theirApp");
    }

    #[test]
    fn test_properties_replaced_only_when_given() {
        let mut call = dependency("http://bing.com/");
        let properties = Properties::from([("key".to_string(), "value".to_string())]);

        call.on_response(&IncomingResponse::new(200), Some(properties.clone()))
            .unwrap();

        assert_eq!(call.properties(), &properties);
    }

    #[test]
    fn test_second_completion_is_rejected() {
        let mut call = completed("http://bing.com/", 200);

        let result = call.on_error(CallError::from("late"), None);

        assert!(matches!(result, Err(AutocollectError::CallAlreadyFinalized)));
        assert_eq!(call.status_code(), Some(200));
        assert!(call.properties().is_empty());
    }

    proptest! {
        #[test]
        fn test_completed_dependency_record(
            method in "(get|GET|post|Put|delete)",
            host in "[a-z]{1,10}\\.(com|net|org)",
            path in "(/[a-z0-9]{1,8}){0,3}",
            port in prop::option::of(prop_oneof![Just(80u16), Just(443u16), 1u16..=65535]),
            query in "(\\?[a-z]{1,5}=[a-z0-9]{1,5})?",
        ) {
            let path = if path.is_empty() { "/".to_string() } else { path };
            let authority = match port {
                Some(port) => format!("{host}:{port}"),
                None => host,
            };
            let url = format!("http://{authority}{path}{query}");
            let mut call = HttpDependencyCall::new(
                "",
                &RequestTarget::from(url.as_str()),
                &OutgoingRequest::new(method.clone()),
            );
            call.on_response(&IncomingResponse::new(200), None).unwrap();

            let data = call.get_dependency_data().base_data;
            prop_assert_eq!(data.name, format!("{} {}", method.to_uppercase(), path));
            prop_assert_eq!(data.data, url);
            prop_assert!(data.success);
        }
    }
}
