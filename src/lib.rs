//! Tracekit Library
//!
//! Distributed-tracing instrumentation engine: span lifecycle management,
//! task-local context propagation, pluggable sink dispatch, and safe capture
//! of request/response metadata with redaction and size limits.
//!
//! # Features
//!
//! - **Exactly-once finish**: spans close on success, error, and cancellation
//! - **Task-local context**: concurrent tasks never see each other's span
//! - **Pluggable sinks**: log and Prometheus adapters, fault-isolated
//! - **Safe capture**: secret masking and body truncation built in
//! - **Off the hot path**: dispatch is synchronous and bounded
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracekit::adapters::{LogAdapter, LogAdapterConfig};
//! use tracekit::dispatch::Dispatcher;
//! use tracekit::http::{HttpClient, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut dispatcher = Dispatcher::new();
//!     dispatcher.register(Arc::new(LogAdapter::new(LogAdapterConfig::default())))?;
//!     let dispatcher = Arc::new(dispatcher);
//!     dispatcher.start().await?;
//!
//!     let client = HttpClient::with_defaults(dispatcher.clone())?;
//!     let response = client
//!         .request("GET", "https://example.com/health", RequestOptions::default())
//!         .await?;
//!     println!("status {}", response.status);
//!
//!     dispatcher.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod annotate;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod span;

// Re-export commonly used types
pub use config::TracekitConfig;
pub use context::{current, span_scope};
pub use dispatch::Dispatcher;
pub use span::{Span, SpanKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
