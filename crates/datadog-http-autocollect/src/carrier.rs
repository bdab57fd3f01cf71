// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Carrier traits for reading and writing correlation headers.
//!
//! HTTP messages show up in two shapes: ones exposing a header accessor (an
//! [`http::HeaderMap`](hyper::http::HeaderMap) behind a request or response) and
//! ones that are only a raw name/value map. [`HttpMessage`] lets callers expose
//! either, and [`header_value`] always tries the accessor form first.
//!
//! # Case Insensitivity
//!
//! All carrier implementations are case-insensitive, so `Request-Context` and
//! `request-context` name the same header.

use std::collections::HashMap;

use hyper::http::{header::HeaderName, HeaderMap, HeaderValue};
use tracing::debug;

/// Trait for writing a header into a carrier.
pub trait Injector {
    /// Sets a header, replacing any previous value.
    fn set(&mut self, key: &str, value: String);
}

/// Trait for reading headers from a carrier.
pub trait Extractor {
    /// Gets a header value by name (case-insensitive).
    fn get(&self, key: &str) -> Option<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        // Raw maps built by hand may keep mixed-case names.
        if let Some(value) = HashMap::get(self, key) {
            return Some(value.as_str());
        }
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

impl Injector for HeaderMap {
    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                debug!("Skipping invalid header name {key}: {e}");
                return;
            }
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(e) => debug!("Skipping invalid value for header {key}: {e}"),
        }
    }
}

impl Extractor for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }
}

/// An HTTP request or response whose headers can be inspected.
///
/// Implementors override whichever of the two read styles they support. Messages
/// that may still be modified before they go on the wire (outgoing requests,
/// server responses) also return an [`Injector`]; the rest keep the default and
/// header writes become no-ops.
pub trait HttpMessage {
    /// Header accessor, preferred over [`HttpMessage::raw_headers`] when present.
    fn header_accessor(&self) -> Option<&dyn Extractor> {
        None
    }

    /// Raw header map.
    fn raw_headers(&self) -> Option<&HashMap<String, String>> {
        None
    }

    /// Writable headers, for messages that have not been sent yet.
    fn header_injector(&mut self) -> Option<&mut dyn Injector> {
        None
    }
}

/// A bare header map is a read-only raw-style message.
impl HttpMessage for HashMap<String, String> {
    fn raw_headers(&self) -> Option<&HashMap<String, String>> {
        Some(self)
    }
}

/// Reads a header from a message, trying the accessor form first.
pub fn header_value<'a>(message: &'a dyn HttpMessage, name: &str) -> Option<&'a str> {
    if let Some(accessor) = message.header_accessor() {
        return accessor.get(name);
    }
    message
        .raw_headers()
        .and_then(|headers| Extractor::get(headers, name))
}

/// Writes a header into a message. Returns `false` when the message is read-only.
pub fn set_header_value(message: &mut dyn HttpMessage, name: &str, value: String) -> bool {
    match message.header_injector() {
        Some(injector) => {
            injector.set(name, value);
            true
        }
        None => {
            debug!("Message does not accept outbound headers, not setting {name}");
            false
        }
    }
}
