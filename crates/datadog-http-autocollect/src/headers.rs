// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP header names used for cross-process correlation.

/// Correlation header. The value is a dictionary of the form `key=value,key=value`.
///
/// Example: `Request-Context: appId=cid-v1:1234`
pub const REQUEST_CONTEXT_HEADER: &str = "Request-Context";

/// Key inside [`REQUEST_CONTEXT_HEADER`] carrying the sender's application id.
pub const APP_ID_KEY: &str = "appId";

/// base64(sha256) of the caller's instrumentation key, sent on outbound requests.
pub const REQUEST_SOURCE_IKEY_HEADER: &str = "x-ms-request-source-ikey";

/// Parent id of an inbound request.
///
/// Example: `x-ms-request-id: |4bf92f35.1`
pub const REQUEST_ID_HEADER: &str = "x-ms-request-id";

/// Operation (root) id of an inbound request.
pub const REQUEST_ROOT_ID_HEADER: &str = "x-ms-request-root-id";

pub const COOKIE_HEADER: &str = "cookie";
pub const USER_AGENT_HEADER: &str = "user-agent";
pub const HOST_HEADER: &str = "host";

// Client IP candidates, in precedence order.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const CLIENT_IP_HEADER: &str = "x-client-ip";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Cookie holding `{session id}|{timestamp}`.
pub const SESSION_COOKIE: &str = "ai_session";

/// Cookie holding `{user id}|{timestamp}`.
pub const USER_COOKIE: &str = "ai_user";
