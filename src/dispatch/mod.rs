//! Dispatcher: owns the adapter set and fans out finished spans
//!
//! The dispatcher is the one process-wide delivery point for finished spans.
//! It has an explicit lifecycle tied to service startup/shutdown:
//!
//! ```text
//! Stopped ──start()──► Starting ──► Started ──stop()──► Stopping ──► Stopped
//! ```
//!
//! Adapters are registered before `start()` (enforced at compile time via
//! `&mut self`), started in registration order with fail-fast semantics, and
//! stopped in reverse order collecting every failure. During dispatch each
//! adapter is isolated: one sink's failure is logged and never prevents the
//! remaining sinks from receiving the span, and never reaches the caller.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tracekit::adapters::{LogAdapter, LogAdapterConfig};
//! use tracekit::dispatch::Dispatcher;
//!
//! # async fn example() -> Result<(), tracekit::dispatch::DispatchError> {
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register(Arc::new(LogAdapter::new(LogAdapterConfig::default())))?;
//! let dispatcher = Arc::new(dispatcher);
//! dispatcher.start().await?;
//! // ... spans finish and are fanned out ...
//! dispatcher.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::{Adapter, AdapterError};
use crate::span::Span;

/// Dispatcher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// Errors from dispatcher lifecycle operations.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("adapter `{name}` failed to start: {source}")]
    AdapterStart {
        name: String,
        #[source]
        source: AdapterError,
    },

    #[error("operation invalid in state {actual:?} (expected {expected:?})")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("{} adapter(s) failed to stop", failures.len())]
    Stop {
        failures: Vec<(String, AdapterError)>,
    },
}

/// Owns an ordered list of adapters and delivers every finished span to each
/// enabled one.
pub struct Dispatcher {
    adapters: Vec<Arc<dyn Adapter>>,
    state: Mutex<LifecycleState>,
    handle_failures: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            state: Mutex::new(LifecycleState::Stopped),
            handle_failures: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Number of spans an adapter failed to handle (counted once per failing
    /// adapter per span). Observability for operators; the failures
    /// themselves never reach the code that produced the span.
    pub fn handle_failure_count(&self) -> u64 {
        self.handle_failures.load(Ordering::Relaxed)
    }

    /// Append an adapter. Registration order is preserved for start, dispatch
    /// and (reversed) stop. Only valid before `start()`.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) -> Result<(), DispatchError> {
        let state = self.state();
        if state != LifecycleState::Stopped {
            return Err(DispatchError::InvalidState {
                expected: LifecycleState::Stopped,
                actual: state,
            });
        }
        debug!(adapter = adapter.name(), "registered span adapter");
        self.adapters.push(adapter);
        Ok(())
    }

    /// Start every adapter in registration order. Fail-fast: the first
    /// failure is returned and no further adapter is started — a broken sink
    /// should block service readiness.
    pub async fn start(&self) -> Result<(), DispatchError> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Stopped {
                return Err(DispatchError::InvalidState {
                    expected: LifecycleState::Stopped,
                    actual: *state,
                });
            }
            *state = LifecycleState::Starting;
        }
        for adapter in &self.adapters {
            if let Err(source) = adapter.start(self).await {
                *self.state.lock() = LifecycleState::Stopped;
                return Err(DispatchError::AdapterStart {
                    name: adapter.name().to_string(),
                    source,
                });
            }
            debug!(adapter = adapter.name(), "span adapter started");
        }
        *self.state.lock() = LifecycleState::Started;
        Ok(())
    }

    /// Deliver one finished span to every enabled adapter, in registration
    /// order. A failing adapter is logged and skipped; the failure never
    /// propagates to the caller and never blocks the remaining adapters.
    pub fn dispatch(&self, span: &Span) {
        if self.state() != LifecycleState::Started {
            warn!(
                span_id = %span.span_id(),
                "span finished while dispatcher is not started; dropping"
            );
            return;
        }
        for adapter in &self.adapters {
            if !adapter.enabled() {
                continue;
            }
            if let Err(e) = adapter.handle(span) {
                self.handle_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    adapter = adapter.name(),
                    span_id = %span.span_id(),
                    error = %e,
                    "span adapter failed; continuing with remaining adapters"
                );
            }
        }
    }

    /// Stop every adapter in reverse registration order, collecting (not
    /// short-circuiting on) individual failures.
    pub async fn stop(&self) -> Result<(), DispatchError> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Started {
                return Err(DispatchError::InvalidState {
                    expected: LifecycleState::Started,
                    actual: *state,
                });
            }
            *state = LifecycleState::Stopping;
        }
        let mut failures = Vec::new();
        for adapter in self.adapters.iter().rev() {
            if let Err(e) = adapter.stop().await {
                warn!(adapter = adapter.name(), error = %e, "span adapter failed to stop");
                failures.push((adapter.name().to_string(), e));
            }
        }
        *self.state.lock() = LifecycleState::Stopped;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Stop { failures })
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
