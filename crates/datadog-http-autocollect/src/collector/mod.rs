// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle tracking for observed calls.
//!
//! A collector binds each observed call to one entity, finalizes it on the
//! single terminal event and hands the record to the [`Client`]. Only one
//! collector per call kind may be active in a process; [`Registration`]
//! enforces that.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::call::CallEntity;
use crate::client::{CallContext, Client};
use crate::contracts::{context_tag_keys, Tags};
use crate::correlation::CorrelationContextManager;
use crate::error::{AutocollectError, CallKind};

pub mod dependency;
pub mod request;

static REQUEST_COLLECTOR_ACTIVE: AtomicBool = AtomicBool::new(false);
static DEPENDENCY_COLLECTOR_ACTIVE: AtomicBool = AtomicBool::new(false);

fn slot(kind: CallKind) -> &'static AtomicBool {
    match kind {
        CallKind::Request => &REQUEST_COLLECTOR_ACTIVE,
        CallKind::Dependency => &DEPENDENCY_COLLECTOR_ACTIVE,
    }
}

/// Claim on the process-wide collector slot of one call kind, released on drop.
#[derive(Debug)]
pub struct Registration {
    kind: CallKind,
}

impl Registration {
    pub fn acquire(kind: CallKind) -> Result<Registration, AutocollectError> {
        match slot(kind).compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(Registration { kind }),
            Err(_) => {
                warn!("An HTTP {kind} collector is already registered for this process");
                Err(AutocollectError::CollectorAlreadyRegistered(kind))
            }
        }
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        slot(self.kind).store(false, Ordering::Release);
    }
}

/// Client context tags completed with the ambient correlation context.
/// Values in the client tags win.
pub(crate) fn ambient_tags(client: &Client, include_parent_id: bool) -> Tags {
    let mut tags = client.context_tags().clone();
    if let Some(context) = CorrelationContextManager::current() {
        let operation = context.operation();
        let mut fill = |key: &str, value: String| {
            let present = tags.get(key).is_some_and(|existing| !existing.is_empty());
            if !present && !value.is_empty() {
                tags.insert(key.to_string(), value);
            }
        };
        fill(context_tag_keys::OPERATION_ID, operation.id);
        fill(context_tag_keys::OPERATION_NAME, operation.name);
        if include_parent_id {
            fill(context_tag_keys::OPERATION_PARENT_ID, operation.parent_id);
        }
    }
    tags
}

/// Sends a finished entity to the client.
pub(crate) fn emit<E: CallEntity>(client: &Client, entity: &E, ambient: &Tags, context: CallContext) {
    client.track(entity.telemetry(), entity.tags(ambient), context);
}
