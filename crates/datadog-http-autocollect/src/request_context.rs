// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Codec for the `Request-Context` correlation header.
//!
//! The header value is a comma-separated list of pairs:
//!
//! ```text
//! pair (',' pair)*      pair := key '=' value | key
//! ```
//!
//! Whitespace around `,` and `=` is not significant. A key without a value
//! stands for itself, e.g. `Request-Context: flag` decodes to `{flag: flag}`.
//! Each side of a call writes its own application id into the header so the
//! other side can learn who it talked to.

use std::collections::BTreeMap;

use crate::carrier::{header_value, set_header_value, HttpMessage};
use crate::headers::REQUEST_CONTEXT_HEADER;

/// Decoded `Request-Context` header.
pub type RequestContext = BTreeMap<String, String>;

/// Decodes a raw header value. Empty input yields an empty context.
pub fn decode(raw: &str) -> RequestContext {
    let mut context = RequestContext::new();
    for segment in raw.split(',') {
        let (key, value) = match segment.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (segment.trim(), ""),
        };
        if key.is_empty() {
            continue;
        }
        let value = if value.is_empty() { key } else { value };
        context.insert(key.to_string(), value.to_string());
    }
    context
}

/// Encodes a context as `key=value` pairs joined by `,`.
pub fn encode(context: &RequestContext) -> String {
    context
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Reads and decodes the `Request-Context` header of a message.
pub fn get_request_context(message: &dyn HttpMessage) -> RequestContext {
    header_value(message, REQUEST_CONTEXT_HEADER)
        .map(decode)
        .unwrap_or_default()
}

/// Writes `context` as the `Request-Context` header. Messages that cannot carry
/// outbound headers are left untouched.
pub fn set_request_context(message: &mut dyn HttpMessage, context: &RequestContext) {
    set_header_value(message, REQUEST_CONTEXT_HEADER, encode(context));
}
