// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ambient correlation context for code running inside an observed call.
//!
//! The context is bound to the tokio task executing the call with
//! [`CorrelationContextManager::run_with_context`]. Work spawned onto other
//! tasks does not see it unless wrapped with [`CorrelationContextManager::wrap`],
//! and concurrently handled calls never observe each other's context.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

tokio::task_local! {
    static CURRENT: Option<Arc<CorrelationContext>>;
}

/// Operation identifiers shared by every call in one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operation {
    pub id: String,
    pub name: String,
    pub parent_id: String,
}

/// Correlation record for one call chain.
///
/// Calls inside the chain may refine the operation (a synchronously tracked
/// request overwrites it), so it sits behind a lock.
#[derive(Debug, Default)]
pub struct CorrelationContext {
    operation: Mutex<Operation>,
}

impl CorrelationContext {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation: Mutex::new(operation),
        }
    }

    /// Snapshot of the current operation.
    pub fn operation(&self) -> Operation {
        self.lock().clone()
    }

    /// Mutates the operation in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Operation),
    {
        f(&mut self.lock());
    }

    fn lock(&self) -> MutexGuard<'_, Operation> {
        self.operation
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Entry points for creating, reading and scoping correlation contexts.
pub struct CorrelationContextManager;

impl CorrelationContextManager {
    /// Builds a context for a new call.
    ///
    /// A missing `operation_id` starts a new operation with a fresh id, and a
    /// missing `parent_id` makes the operation its own parent.
    pub fn generate_context_object(
        parent_id: Option<&str>,
        operation_name: &str,
        operation_id: Option<&str>,
    ) -> Arc<CorrelationContext> {
        let id = non_empty(operation_id).unwrap_or_else(|| Uuid::new_v4().to_string());
        let parent_id = non_empty(parent_id).unwrap_or_else(|| id.clone());

        Arc::new(CorrelationContext::new(Operation {
            id,
            name: operation_name.to_string(),
            parent_id,
        }))
    }

    /// The context of the call chain the current task belongs to.
    pub fn current() -> Option<Arc<CorrelationContext>> {
        CURRENT.try_with(Clone::clone).ok().flatten()
    }

    /// Runs `future` with `context` as the ambient context. The previous
    /// context is restored when the future completes. `None` leaves the
    /// ambient context as it is.
    pub async fn run_with_context<F>(context: Option<Arc<CorrelationContext>>, future: F) -> F::Output
    where
        F: Future,
    {
        match context {
            Some(context) => CURRENT.scope(Some(context), future).await,
            None => future.await,
        }
    }

    /// Synchronous counterpart of [`CorrelationContextManager::run_with_context`].
    pub fn run_with_context_sync<F, R>(context: Option<Arc<CorrelationContext>>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        match context {
            Some(context) => CURRENT.sync_scope(Some(context), f),
            None => f(),
        }
    }

    /// Binds `future` to the context that is current now, so it keeps seeing
    /// it when polled from another task.
    pub fn wrap<F>(future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let context = Self::current();
        Self::run_with_context(context, future)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|value| !value.is_empty()).map(str::to_string)
}
