// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration loaded from the environment.

use std::env;

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::app_id;
use crate::error::AutocollectError;
use crate::url_builder::hostname;

/// Prefix Azure App Service adds to application settings.
const AZURE_PREFIX: &str = "APPSETTING_";
const ENV_IKEY: &str = "APPINSIGHTS_INSTRUMENTATIONKEY";
const LEGACY_ENV_IKEY: &str = "APPINSIGHTS_INSTRUMENTATION_KEY";
const ENV_EXCLUDED_DOMAINS: &str = "APPINSIGHTS_CORRELATION_EXCLUDED_DOMAINS";
const ENV_LOG_LEVEL: &str = "APPINSIGHTS_LOG_LEVEL";

const DEFAULT_ENDPOINT_URL: &str = "https://dc.services.visualstudio.com/v2/track";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Domains that reject requests carrying unknown headers.
const DEFAULT_EXCLUDED_DOMAINS: [&str; 4] = [
    "*.blob.core.windows.net",
    "*.blob.core.chinacloudapi.cn",
    "*.blob.core.cloudapi.de",
    "*.blob.core.usgovcloudapi.net",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub instrumentation_key: String,
    /// base64(sha256(instrumentation_key))
    pub instrumentation_key_hash: String,
    pub endpoint_url: String,
    pub session_renewal_ms: u64,
    pub session_expiration_ms: u64,
    pub max_batch_size: usize,
    pub max_batch_interval_ms: u64,
    pub disable_app_insights: bool,
    pub sampling_percentage: f64,
    /// Wildcard host patterns that never get a `Request-Context` header.
    pub correlation_header_excluded_domains: Vec<String>,
    pub log_level: String,
    excluded_domain_patterns: Vec<Regex>,
}

impl Config {
    /// Builds a config for `instrumentation_key`, falling back to the
    /// environment when no key is given.
    pub fn new(instrumentation_key: Option<&str>) -> Result<Config, AutocollectError> {
        let instrumentation_key = match instrumentation_key.filter(|key| !key.is_empty()) {
            Some(key) => key.to_string(),
            None => instrumentation_key_from_env()?,
        };

        let correlation_header_excluded_domains: Vec<String> = match env::var(ENV_EXCLUDED_DOMAINS) {
            Ok(domains) => domains
                .split(',')
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => DEFAULT_EXCLUDED_DOMAINS
                .iter()
                .map(|domain| domain.to_string())
                .collect(),
        };

        let config = Config {
            instrumentation_key_hash: hash_base64(&instrumentation_key),
            instrumentation_key,
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            session_renewal_ms: 30 * 60 * 1000,
            session_expiration_ms: 24 * 60 * 60 * 1000,
            max_batch_size: 250,
            max_batch_interval_ms: 15_000,
            disable_app_insights: false,
            sampling_percentage: 100.0,
            excluded_domain_patterns: compile_patterns(&correlation_header_excluded_domains)?,
            correlation_header_excluded_domains,
            log_level: env::var(ENV_LOG_LEVEL)
                .map(|level| level.to_lowercase())
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a config whose key comes only from the environment.
    pub fn from_env() -> Result<Config, AutocollectError> {
        Config::new(None)
    }

    pub fn validate(&self) -> Result<(), AutocollectError> {
        if self.instrumentation_key.is_empty() {
            return Err(AutocollectError::MissingInstrumentationKey);
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(AutocollectError::InvalidConfig(format!(
                "unknown log level {}",
                self.log_level
            )));
        }
        if !(0.0..=100.0).contains(&self.sampling_percentage) {
            return Err(AutocollectError::InvalidConfig(format!(
                "sampling percentage {} is outside 0..=100",
                self.sampling_percentage
            )));
        }
        Ok(())
    }

    /// Application id of this process, empty while it is not known.
    pub fn app_id(&self) -> String {
        app_id::app_id_for(&self.instrumentation_key).unwrap_or_default()
    }

    /// Whether a `Request-Context` header may be sent to `url`.
    pub fn can_include_correlation_header(&self, url: &str) -> bool {
        let host = hostname(url);
        if host.is_empty() {
            return true;
        }
        match self
            .excluded_domain_patterns
            .iter()
            .find(|pattern| pattern.is_match(&host))
        {
            Some(pattern) => {
                debug!("Not adding correlation header for {host}, excluded by {pattern}");
                false
            }
            None => true,
        }
    }
}

fn instrumentation_key_from_env() -> Result<String, AutocollectError> {
    [
        ENV_IKEY.to_string(),
        format!("{AZURE_PREFIX}{ENV_IKEY}"),
        LEGACY_ENV_IKEY.to_string(),
        format!("{AZURE_PREFIX}{LEGACY_ENV_IKEY}"),
    ]
    .iter()
    .filter_map(|name| env::var(name).ok())
    .find(|key| !key.is_empty())
    .ok_or(AutocollectError::MissingInstrumentationKey)
}

fn hash_base64(value: &str) -> String {
    STANDARD.encode(Sha256::digest(value.as_bytes()))
}

/// `*` matches any run of characters, everything else is literal.
fn compile_patterns(domains: &[String]) -> Result<Vec<Regex>, AutocollectError> {
    domains
        .iter()
        .map(|domain| {
            let escaped = domain
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            Regex::new(&format!("(?i)^{escaped}$")).map_err(|e| {
                AutocollectError::InvalidConfig(format!("excluded domain {domain}: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;
    use serial_test::serial;
    use std::env;

    use super::*;

    fn clear_env() {
        for name in [
            "APPINSIGHTS_INSTRUMENTATIONKEY",
            "APPSETTING_APPINSIGHTS_INSTRUMENTATIONKEY",
            "APPINSIGHTS_INSTRUMENTATION_KEY",
            "APPSETTING_APPINSIGHTS_INSTRUMENTATION_KEY",
            "APPINSIGHTS_CORRELATION_EXCLUDED_DOMAINS",
            "APPINSIGHTS_LOG_LEVEL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_error_if_no_instrumentation_key() {
        clear_env();
        let config = Config::from_env();
        assert!(matches!(
            config,
            Err(AutocollectError::MissingInstrumentationKey)
        ));
    }

    #[test]
    #[serial]
    fn test_explicit_key_wins_over_env() {
        clear_env();
        env::set_var("APPINSIGHTS_INSTRUMENTATIONKEY", "from-env");
        let config = Config::new(Some("explicit")).unwrap();
        assert_eq!(config.instrumentation_key, "explicit");
        clear_env();
    }

    #[duplicate_item(
        test_name                       env_name;
        [test_key_from_env]             ["APPINSIGHTS_INSTRUMENTATIONKEY"];
        [test_key_from_azure_env]       ["APPSETTING_APPINSIGHTS_INSTRUMENTATIONKEY"];
        [test_key_from_legacy_env]      ["APPINSIGHTS_INSTRUMENTATION_KEY"];
        [test_key_from_legacy_azure]    ["APPSETTING_APPINSIGHTS_INSTRUMENTATION_KEY"];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        env::set_var(env_name, "env-key");
        let config = Config::from_env().unwrap();
        assert_eq!(config.instrumentation_key, "env-key");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::new(Some("key")).unwrap();
        assert_eq!(config.endpoint_url, "https://dc.services.visualstudio.com/v2/track");
        assert_eq!(config.session_renewal_ms, 1_800_000);
        assert_eq!(config.session_expiration_ms, 86_400_000);
        assert_eq!(config.max_batch_size, 250);
        assert_eq!(config.max_batch_interval_ms, 15_000);
        assert_eq!(config.sampling_percentage, 100.0);
        assert!(!config.disable_app_insights);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.correlation_header_excluded_domains.len(), 4);
    }

    #[test]
    #[serial]
    fn test_key_hash() {
        clear_env();
        let config = Config::new(Some("key")).unwrap();
        // sha256("key"), base64 encoded
        assert_eq!(
            config.instrumentation_key_hash,
            "LHDhK3oGRvkiefQnx7OOczTY5Tic/xZ6HcMOc/gmtoM="
        );
    }

    #[test]
    #[serial]
    fn test_invalid_log_level() {
        clear_env();
        env::set_var("APPINSIGHTS_LOG_LEVEL", "verbose");
        let config = Config::new(Some("key"));
        assert!(matches!(config, Err(AutocollectError::InvalidConfig(_))));
        clear_env();
    }

    #[duplicate_item(
        test_name                           url                                                       expected;
        [test_blob_storage_is_excluded]     ["https://account.blob.core.windows.net/container"]       [false];
        [test_china_blob_is_excluded]       ["https://ACCOUNT.blob.core.chinacloudapi.cn/"]           [false];
        [test_other_host_is_included]       ["https://bing.com/search?q=test"]                        [true];
        [test_lookalike_host_is_included]   ["https://blob.core.windows.net.example.com/"]            [true];
        [test_unparseable_url_is_included]  ["not a url"]                                             [true];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        let config = Config::new(Some("key")).unwrap();
        assert_eq!(config.can_include_correlation_header(url), expected);
    }

    #[test]
    #[serial]
    fn test_excluded_domains_from_env() {
        clear_env();
        env::set_var("APPINSIGHTS_CORRELATION_EXCLUDED_DOMAINS", "*.internal, bing.com");
        let config = Config::new(Some("key")).unwrap();

        assert!(!config.can_include_correlation_header("http://svc.internal/"));
        assert!(!config.can_include_correlation_header("http://bing.com/"));
        assert!(config.can_include_correlation_header("https://account.blob.core.windows.net/"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_app_id_follows_cache() {
        clear_env();
        crate::app_id::clear();
        let config = Config::new(Some("config-test-key")).unwrap();
        assert_eq!(config.app_id(), "");

        crate::app_id::register_app_id("config-test-key", "cid-v1:config");

        assert_eq!(config.app_id(), "cid-v1:config");
        crate::app_id::clear();
    }
}
