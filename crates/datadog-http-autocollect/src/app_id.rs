// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide cache of instrumentation key to application id.
//!
//! The cache starts empty and is append-only: once an id is known for a key it
//! is never replaced. Resolving ids against the ingestion service belongs to
//! the surrounding agent, which registers them here.

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use tracing::{debug, warn};

lazy_static! {
    static ref APP_IDS: RwLock<HashMap<String, String>> = RwLock::new(HashMap::new());
}

/// Application id registered for `instrumentation_key`.
pub fn app_id_for(instrumentation_key: &str) -> Option<String> {
    match APP_IDS.read() {
        Ok(ids) => ids.get(instrumentation_key).cloned(),
        Err(poisoned) => poisoned.into_inner().get(instrumentation_key).cloned(),
    }
}

/// Records the application id of `instrumentation_key`.
///
/// Returns `false` when the key already has an id; the existing one is kept.
pub fn register_app_id(instrumentation_key: &str, app_id: &str) -> bool {
    let mut ids = match APP_IDS.write() {
        Ok(ids) => ids,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(existing) = ids.get(instrumentation_key) {
        if existing != app_id {
            warn!("Ignoring new application id for a key that already has one");
        }
        return false;
    }
    debug!("Registered application id {app_id}");
    ids.insert(instrumentation_key.to_string(), app_id.to_string());
    true
}

#[cfg(test)]
pub(crate) fn clear() {
    if let Ok(mut ids) = APP_IDS.write() {
        ids.clear();
    }
}
