//! Pluggable span sinks
//!
//! An [`Adapter`] consumes finished spans. The [`crate::dispatch::Dispatcher`]
//! owns the adapter set, drives start/stop, and fans out each finished span to
//! every enabled adapter.
//!
//! `start`/`stop` are async (sinks may open/flush network resources);
//! `handle` is synchronous and must stay bounded — a sink that needs slow I/O
//! should enqueue work in `handle` and drain it elsewhere, never block the
//! task that produced the span.

use async_trait::async_trait;
use thiserror::Error;

use crate::dispatch::Dispatcher;
use crate::span::Span;

mod log;
#[cfg(feature = "metrics")]
mod prometheus;

pub use log::{LogAdapter, LogAdapterConfig, ADAPTER_LOG};
#[cfg(feature = "metrics")]
pub use prometheus::{PrometheusAdapter, PrometheusAdapterConfig};

/// Well-known name of the metrics adapter. Kept unconditional so the HTTP
/// layer can register sink-specific display names without caring whether the
/// `metrics` feature is compiled in.
pub const ADAPTER_PROMETHEUS: &str = "prometheus";

/// Errors surfaced by adapter lifecycle and handling.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("adapter configuration invalid: {0}")]
    Config(String),

    #[error("adapter failed to start: {0}")]
    Startup(String),

    #[error("adapter failed to handle span: {0}")]
    Handle(String),

    #[error("adapter failed to stop: {0}")]
    Shutdown(String),
}

/// Contract implemented by span sinks.
///
/// Configuration (at minimum an `enabled` flag) is supplied at construction
/// and never mutated afterwards; the dispatcher consults [`Adapter::enabled`]
/// on every dispatch and skips disabled sinks entirely.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable adapter name, used for registration diagnostics and for
    /// [`Span::name_for_adapter`] lookups.
    fn name(&self) -> &str;

    /// Whether this sink should receive spans.
    fn enabled(&self) -> bool;

    /// Acquire resources. Failure here is fatal at service startup.
    async fn start(&self, dispatcher: &Dispatcher) -> Result<(), AdapterError>;

    /// Consume one finished span. Must not block beyond a bounded, small
    /// amount of work; errors are isolated by the dispatcher and never reach
    /// business logic.
    fn handle(&self, span: &Span) -> Result<(), AdapterError>;

    /// Release resources.
    async fn stop(&self) -> Result<(), AdapterError>;
}
