// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use datadog_http_autocollect::contracts::{RemoteDependencyData, RequestData};
use datadog_http_autocollect::{CallContext, Client, Config, Tags, Telemetry, TelemetrySink};

/// Sink keeping every record it receives
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Telemetry, Tags, CallContext)>>,
}

impl TelemetrySink for RecordingSink {
    fn track(&self, record: Telemetry, tags: Tags, context: CallContext) {
        self.records.lock().unwrap().push((record, tags, context));
    }
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(Telemetry, Tags, CallContext)> {
        self.records.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<(RequestData, Tags)> {
        self.records()
            .into_iter()
            .filter_map(|(record, tags, _)| match record {
                Telemetry::Request(data) => Some((data.base_data, tags)),
                Telemetry::RemoteDependency(_) => None,
            })
            .collect()
    }

    pub fn dependencies(&self) -> Vec<(RemoteDependencyData, Tags)> {
        self.records()
            .into_iter()
            .filter_map(|(record, tags, _)| match record {
                Telemetry::RemoteDependency(data) => Some((data.base_data, tags)),
                Telemetry::Request(_) => None,
            })
            .collect()
    }
}

pub fn client_with_sink() -> (Arc<Client>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let config = Config::new(Some("integration-key")).unwrap();
    (Arc::new(Client::new(config, sink.clone())), sink)
}
