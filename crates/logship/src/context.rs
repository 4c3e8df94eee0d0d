//! Per-client trace-context propagation.
//!
//! The client owns one optional trace id. Records enqueued without an
//! explicit id pick up the current value during enrichment. The scoped
//! override installs an id for the duration of a closure and restores
//! the prior value on every exit path, including a panic inside the
//! closure.
//!
//! The context is client-scoped, not task-local: concurrent callers of
//! the same client share it, and interleaved scoped overrides observe
//! each other. Callers that need strict isolation set `trace_id` on the
//! record itself, which always wins over the shared context.

use std::sync::Mutex;
use uuid::Uuid;

/// Generates a fresh random trace identifier (UUID v4, textual form).
#[must_use]
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// The client's current trace identifier, shared across threads.
#[derive(Debug, Default)]
pub struct TraceContext {
    current: Mutex<Option<String>>,
}

impl TraceContext {
    pub(crate) fn new() -> Self {
        TraceContext::default()
    }

    /// Returns the current trace id, if any.
    pub fn get(&self) -> Option<String> {
        self.current.lock().expect("lock poisoned").clone()
    }

    /// Overwrites the current trace id.
    pub fn set(&self, trace_id: impl Into<String>) {
        *self.current.lock().expect("lock poisoned") = Some(trace_id.into());
    }

    /// Clears the current trace id.
    pub fn clear(&self) {
        *self.current.lock().expect("lock poisoned") = None;
    }

    /// Runs `f` with `trace_id` installed, restoring the prior value
    /// afterwards. Restoration happens on every exit path: the prior
    /// value comes back even if `f` panics.
    pub fn with_trace_id<R>(&self, trace_id: impl Into<String>, f: impl FnOnce() -> R) -> R {
        let prior = {
            let mut current = self.current.lock().expect("lock poisoned");
            std::mem::replace(&mut *current, Some(trace_id.into()))
        };
        let _restore = RestoreGuard {
            context: self,
            prior: Some(prior),
        };
        f()
    }

    /// Like [`with_trace_id`](Self::with_trace_id) with a freshly
    /// generated UUID.
    pub fn with_new_trace_id<R>(&self, f: impl FnOnce() -> R) -> R {
        self.with_trace_id(new_trace_id(), f)
    }
}

struct RestoreGuard<'a> {
    context: &'a TraceContext,
    prior: Option<Option<String>>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            *self.context.current.lock().expect("lock poisoned") = prior;
        }
    }
}
