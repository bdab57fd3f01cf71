// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reconstruction of absolute URLs from partial connection options.
//!
//! HTTP clients accept either a URL string or a loose set of options
//! (`host`, `hostname`, `port`, `path`, ...). Neither the in-flight request nor
//! the response keeps the URL around, so telemetry has to rebuild it the same
//! way the client resolved it:
//!
//! 1. A combined `path` is split into `pathname` + `search` and overrides both.
//! 2. When `host` and `port` are both given and `host` carries no port, `host`
//!    is treated as a bare `hostname` so the explicit `port` is honoured.
//! 3. `protocol` defaults to the transport's protocol (if known) and `hostname`
//!    to `localhost`.
//! 4. The query string always comes from `search`.
//!
//! # Example
//!
//! ```
//! use datadog_http_autocollect::url_builder::{url_from_request_options, RequestOptions, RequestTarget};
//!
//! let target = RequestTarget::Options(RequestOptions {
//!     host: Some("bing.com".to_string()),
//!     port: Some(8000),
//!     path: Some("/search?q=test".to_string()),
//!     ..Default::default()
//! });
//!
//! assert_eq!(
//!     url_from_request_options(&target, Some("http:")),
//!     "http://bing.com:8000/search?q=test"
//! );
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

const DEFAULT_HOSTNAME: &str = "localhost";

/// Schemes whose URLs are written with `//` before the host.
const SLASHED_PROTOCOLS: [&str; 7] = ["http:", "https:", "ftp:", "gopher:", "file:", "ws:", "wss:"];

lazy_static! {
    /// Trailing `:port` on a `host` value.
    static ref HOST_PORT_REGEX: Regex = Regex::new(r":[0-9]+$").expect("failed creating regex");
}

/// Connection options for an outbound call. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Scheme, with or without the trailing `:` (`"https"` or `"https:"`).
    pub protocol: Option<String>,
    /// Host, possibly including a port (`"bing.com:8000"`).
    pub host: Option<String>,
    /// Host without a port.
    pub hostname: Option<String>,
    pub port: Option<u16>,
    /// Path including the query string (`"/search?q=test"`).
    pub path: Option<String>,
    pub pathname: Option<String>,
    /// Query string, with or without the leading `?`.
    pub search: Option<String>,
    pub hash: Option<String>,
    /// Opts this call out of dependency tracking.
    pub disable_auto_collection: bool,
    /// Older name of `disable_auto_collection`, still honoured.
    pub disable_app_insights_auto_collection: bool,
}

/// What the instrumented client was asked to call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Url(String),
    Options(RequestOptions),
}

impl RequestTarget {
    pub fn disables_auto_collection(&self) -> bool {
        match self {
            RequestTarget::Url(_) => false,
            RequestTarget::Options(options) => {
                options.disable_auto_collection || options.disable_app_insights_auto_collection
            }
        }
    }
}

impl From<&str> for RequestTarget {
    fn from(url: &str) -> Self {
        RequestTarget::Url(url.to_string())
    }
}

impl From<String> for RequestTarget {
    fn from(url: String) -> Self {
        RequestTarget::Url(url)
    }
}

impl From<RequestOptions> for RequestTarget {
    fn from(options: RequestOptions) -> Self {
        RequestTarget::Options(options)
    }
}

/// Builds the absolute URL an outbound call is sent to.
///
/// `transport_protocol` is the protocol of the connection agent actually used
/// (e.g. `"https:"`); it fills in a missing `protocol`. Malformed input never
/// fails, it just produces the closest reconstruction.
pub fn url_from_request_options(target: &RequestTarget, transport_protocol: Option<&str>) -> String {
    let mut options = match target {
        RequestTarget::Url(raw) => parse_url_string(raw),
        RequestTarget::Options(options) => options.clone(),
    };

    if let Some(path) = options.path.take().filter(|path| !path.is_empty()) {
        let (pathname, search) = split_path(&path);
        options.pathname = Some(pathname);
        options.search = search;
    }

    if options.port.is_some() {
        if let Some(host) = options.host.take() {
            if HOST_PORT_REGEX.is_match(&host) {
                options.host = Some(host);
            } else {
                options.hostname = Some(host);
            }
        }
    }

    if is_blank(&options.protocol) {
        options.protocol = transport_protocol.map(str::to_string);
    }
    if is_blank(&options.hostname) {
        options.hostname = Some(DEFAULT_HOSTNAME.to_string());
    }

    format_url(&options)
}

/// Builds the absolute URL of an inbound call from its request-target (usually
/// just a path), the `Host` header and whether the connection is encrypted.
pub fn absolute_url(request_url: &str, host: Option<&str>, encrypted: bool) -> String {
    let (pathname, search) = split_path(request_url);
    let options = RequestOptions {
        protocol: Some(if encrypted { "https:" } else { "http:" }.to_string()),
        host: host.filter(|host| !host.is_empty()).map(str::to_string),
        hostname: Some(DEFAULT_HOSTNAME.to_string()),
        pathname: Some(pathname),
        search,
        ..Default::default()
    };
    format_url(&options)
}

/// Path component of a URL, without query string or fragment.
pub fn pathname(url: &str) -> String {
    split_path(url).0
}

/// Host component of a URL, without port.
pub fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Splits a path (or an absolute URL) into its pathname and `?`-prefixed search.
/// Any fragment is dropped.
pub fn split_path(path: &str) -> (String, Option<String>) {
    if let Ok(url) = Url::parse(path) {
        if url.has_host() {
            return (url.path().to_string(), url.query().map(|query| format!("?{query}")));
        }
    }

    let without_hash = path.split('#').next().unwrap_or(path);
    match without_hash.split_once('?') {
        Some((pathname, query)) => (pathname.to_string(), Some(format!("?{query}"))),
        None => (without_hash.to_string(), None),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn parse_url_string(raw: &str) -> RequestOptions {
    match Url::parse(raw) {
        Ok(url) if url.has_host() => RequestOptions {
            protocol: Some(format!("{}:", url.scheme())),
            hostname: url.host_str().map(str::to_string),
            port: explicit_port(raw).or(url.port()),
            pathname: Some(url.path().to_string()),
            search: url.query().map(|query| format!("?{query}")),
            hash: url.fragment().map(|fragment| format!("#{fragment}")),
            ..Default::default()
        },
        // Not an absolute URL, the whole string is a path on the default host.
        _ => RequestOptions {
            path: Some(raw.to_string()),
            ..Default::default()
        },
    }
}

/// Port written in the authority of `raw`, including a scheme's default port
/// which `Url` normalizes away.
fn explicit_port(raw: &str) -> Option<u16> {
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let (host, port) = host_port.rsplit_once(':')?;
    if host.starts_with('[') && !host.ends_with(']') {
        return None;
    }
    port.parse().ok()
}

fn format_url(options: &RequestOptions) -> String {
    let mut protocol = options.protocol.clone().unwrap_or_default().to_lowercase();
    if !protocol.is_empty() && !protocol.ends_with(':') {
        protocol.push(':');
    }

    let host = match (&options.host, &options.hostname) {
        (Some(host), _) if !host.is_empty() => host.clone(),
        (_, Some(hostname)) if !hostname.is_empty() => {
            let mut host = if hostname.contains(':') && !hostname.starts_with('[') {
                format!("[{hostname}]")
            } else {
                hostname.clone()
            };
            if let Some(port) = options.port {
                host.push_str(&format!(":{port}"));
            }
            host
        }
        _ => String::new(),
    };

    let mut pathname = options
        .pathname
        .clone()
        .unwrap_or_default()
        .replace('?', "%3F")
        .replace('#', "%23");

    let slashed = protocol.is_empty() || SLASHED_PROTOCOLS.contains(&protocol.as_str());
    let authority = if slashed && !host.is_empty() {
        if !pathname.is_empty() && !pathname.starts_with('/') {
            pathname.insert(0, '/');
        }
        format!("//{host}")
    } else {
        host
    };

    let mut search = options.search.clone().unwrap_or_default().replace('#', "%23");
    if !search.is_empty() && !search.starts_with('?') {
        search.insert(0, '?');
    }

    let mut hash = options.hash.clone().unwrap_or_default();
    if !hash.is_empty() && !hash.starts_with('#') {
        hash.insert(0, '#');
    }

    format!("{protocol}{authority}{pathname}{search}{hash}")
}
