// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Owned snapshots of the HTTP messages a call is observed through.
//!
//! Inbound requests and incoming responses have already been received, so their
//! headers are read-only. Server responses and outgoing requests can still be
//! modified and accept the `Request-Context` header.

use hyper::http::HeaderMap;

use crate::carrier::{Extractor, HttpMessage, Injector};

/// A request received by a server in this process.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    /// Request target as sent on the wire, usually a path with query string.
    pub url: String,
    pub headers: HeaderMap,
    /// Remote address of the underlying socket.
    pub remote_address: Option<String>,
    /// Whether the request arrived over TLS.
    pub encrypted: bool,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

impl HttpMessage for IncomingRequest {
    fn header_accessor(&self) -> Option<&dyn Extractor> {
        Some(&self.headers)
    }
}

/// The response a server is about to send for an [`IncomingRequest`].
#[derive(Debug, Clone, Default)]
pub struct ServerResponse {
    pub status_code: Option<u16>,
    pub headers: HeaderMap,
}

impl ServerResponse {
    pub fn with_status(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            headers: HeaderMap::new(),
        }
    }
}

impl HttpMessage for ServerResponse {
    fn header_accessor(&self) -> Option<&dyn Extractor> {
        Some(&self.headers)
    }

    fn header_injector(&mut self) -> Option<&mut dyn Injector> {
        Some(&mut self.headers)
    }
}

/// A request this process is about to send.
#[derive(Debug, Clone, Default)]
pub struct OutgoingRequest {
    /// Empty means `GET`.
    pub method: String,
    pub headers: HeaderMap,
    /// Protocol of the connection the request goes through (`http:` / `https:`).
    pub agent_protocol: Option<String>,
}

impl OutgoingRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }
}

impl HttpMessage for OutgoingRequest {
    fn header_accessor(&self) -> Option<&dyn Extractor> {
        Some(&self.headers)
    }

    fn header_injector(&mut self) -> Option<&mut dyn Injector> {
        Some(&mut self.headers)
    }
}

/// The response received for an [`OutgoingRequest`].
#[derive(Debug, Clone, Default)]
pub struct IncomingResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
}

impl IncomingResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HeaderMap::new(),
        }
    }
}

impl HttpMessage for IncomingResponse {
    fn header_accessor(&self) -> Option<&dyn Extractor> {
        Some(&self.headers)
    }
}
