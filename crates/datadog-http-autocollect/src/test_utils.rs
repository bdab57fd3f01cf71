// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the unit tests.

use std::sync::{Arc, Mutex};

use crate::client::{CallContext, Client, TelemetrySink};
use crate::config::Config;
use crate::contracts::{Tags, Telemetry};

/// Sink keeping every record it receives.
#[derive(Default)]
pub(crate) struct RecordingSink {
    records: Mutex<Vec<(Telemetry, Tags)>>,
}

impl TelemetrySink for RecordingSink {
    fn track(&self, record: Telemetry, tags: Tags, _context: CallContext) {
        self.records.lock().unwrap().push((record, tags));
    }
}

impl RecordingSink {
    pub(crate) fn records(&self) -> Vec<(Telemetry, Tags)> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn base_types(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|(record, _)| record.base_type().to_string())
            .collect()
    }
}

/// Client for the instrumentation key `"key"` writing into `sink`.
pub(crate) fn client(sink: &Arc<RecordingSink>) -> Arc<Client> {
    Arc::new(Client::new(Config::new(Some("key")).unwrap(), sink.clone()))
}
