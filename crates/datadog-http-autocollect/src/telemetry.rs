// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output for the collectors.
//!
//! Lines are prefixed so they can be told apart from the host application's
//! own logs:
//!
//! ```text
//! APPINSIGHTS | LEVEL | [span_name{span_fields}:] message {event_fields}
//! APPINSIGHTS | DEBUG | Tracking dependency GET http://bing.com/ with status Some(200)
//! ```

use std::fmt;

use tracing::debug;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::AutocollectError;

/// Log formatter writing the `APPINSIGHTS` prefix, the level and the active
/// spans before each message.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "APPINSIGHTS | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber. `log_level` is any `EnvFilter` directive,
/// usually the config's `log_level`.
pub fn init_logging(log_level: &str) -> Result<(), AutocollectError> {
    let env_filter = format!("h2=off,hyper=off,{log_level}");
    let filter =
        EnvFilter::try_new(env_filter).map_err(|e| AutocollectError::Logging(e.to_string()))?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AutocollectError::Logging(e.to_string()))?;

    debug!("Logging subsystem enabled");
    Ok(())
}

/// Installs the global subscriber at the level set by `APPINSIGHTS_LOG_LEVEL`.
pub fn init_logging_from_config(config: &Config) -> Result<(), AutocollectError> {
    init_logging(&config.log_level)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use serial_test::serial;
    use tracing::{info, info_span, warn};

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(Formatter)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_prefix_and_level() {
        let output = capture(|| info!("collector started"));
        assert_eq!(output, "APPINSIGHTS | INFO | collector started\n");
    }

    #[test]
    fn test_span_fields() {
        let output = capture(|| {
            let span = info_span!("dependency", method = "GET");
            let _entered = span.enter();
            warn!(status = 500, "call failed");
        });
        assert_eq!(
            output,
            "APPINSIGHTS | WARN | dependency{method=\"GET\"}: call failed status=500\n"
        );
    }

    #[test]
    #[serial]
    fn test_config_log_level_is_used() {
        let mut config = Config::new(Some("key")).unwrap();
        config.log_level = "autocollect=verbose".to_string();

        let result = init_logging_from_config(&config);

        assert!(matches!(result, Err(AutocollectError::Logging(_))));
    }

    #[test]
    fn test_invalid_directive() {
        let result = init_logging("autocollect=verbose");
        assert!(matches!(result, Err(AutocollectError::Logging(_))));
    }
}
