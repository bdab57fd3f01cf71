// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client identity extraction from inbound request headers and cookies.

use lazy_static::lazy_static;
use regex::Regex;

use crate::carrier::{header_value, HttpMessage};
use crate::headers::{
    CLIENT_IP_HEADER, COOKIE_HEADER, FORWARDED_FOR_HEADER, REAL_IP_HEADER, SESSION_COOKIE,
    USER_COOKIE,
};

const LOOPBACK_IPV4: &str = "127.0.0.1";

lazy_static! {
    /// IPv4 address without port. A port in the location tag gets the payload
    /// rejected by the collector.
    static ref IPV4_REGEX: Regex =
        Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").expect("failed creating regex");
}

/// Resolves the client IP of an inbound request.
///
/// Candidates are `x-forwarded-for`, `x-client-ip`, `x-real-ip` and then the
/// socket's remote address, in that order. The first one containing an IPv4
/// address wins. An IPv6 socket address of the `::` family with no IPv4 form
/// is reported as `127.0.0.1`.
pub fn client_ip(message: &dyn HttpMessage, socket_remote_address: Option<&str>) -> Option<String> {
    let found = [FORWARDED_FOR_HEADER, CLIENT_IP_HEADER, REAL_IP_HEADER]
        .iter()
        .map(|name| header_value(message, name))
        .chain(std::iter::once(socket_remote_address))
        .flatten()
        .find_map(|candidate| IPV4_REGEX.find(candidate))
        .map(|ip| ip.as_str().to_string());

    if found.is_some() {
        return found;
    }

    socket_remote_address
        .filter(|address| address.starts_with("::"))
        .map(|_| LOOPBACK_IPV4.to_string())
}

/// Finds the value of the cookie called `name` in a `Cookie` header.
pub fn get_cookie<'a>(name: &str, cookie_header: &'a str) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }
    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(name)?.strip_prefix('='))
}

/// Extracts the id from a `{id}|{timestamp}` cookie value.
///
/// ```
/// use datadog_http_autocollect::identity::parse_id;
///
/// assert_eq!(parse_id("id|1234|1234"), Some("id"));
/// assert_eq!(parse_id("no-delimiter"), None);
/// ```
pub fn parse_id(cookie_value: &str) -> Option<&str> {
    cookie_value
        .split_once('|')
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty())
}

/// Session id from the `ai_session` cookie.
pub fn session_id(message: &dyn HttpMessage) -> Option<String> {
    cookie_id(message, SESSION_COOKIE)
}

/// User id from the `ai_user` cookie.
pub fn user_id(message: &dyn HttpMessage) -> Option<String> {
    cookie_id(message, USER_COOKIE)
}

fn cookie_id(message: &dyn HttpMessage, name: &str) -> Option<String> {
    let cookie_header = header_value(message, COOKIE_HEADER)?;
    get_cookie(name, cookie_header)
        .and_then(parse_id)
        .map(str::to_string)
}
