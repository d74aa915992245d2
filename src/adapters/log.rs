//! Log sink: one structured `tracing` event per finished span.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Adapter, AdapterError};
use crate::dispatch::Dispatcher;
use crate::span::Span;

pub const ADAPTER_LOG: &str = "log";

/// Log adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAdapterConfig {
    /// Whether the adapter receives spans.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Include the JSON-rendered tag map in each event.
    #[serde(default = "default_enabled")]
    pub include_tags: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for LogAdapterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_tags: true,
        }
    }
}

/// Emits finished spans as structured log events under the
/// `tracekit::span` target.
pub struct LogAdapter {
    cfg: LogAdapterConfig,
}

impl LogAdapter {
    pub fn new(cfg: LogAdapterConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Adapter for LogAdapter {
    fn name(&self) -> &str {
        ADAPTER_LOG
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn start(&self, _dispatcher: &Dispatcher) -> Result<(), AdapterError> {
        Ok(())
    }

    fn handle(&self, span: &Span) -> Result<(), AdapterError> {
        let duration_ms = span
            .duration()
            .map(|d| d.num_microseconds().unwrap_or_default() as f64 / 1000.0)
            .unwrap_or_default();
        let name = span.name().unwrap_or_default();
        let status = if span.error().is_some() { "error" } else { "ok" };

        if self.cfg.include_tags {
            let tags = serde_json::to_string(&span.tags())
                .map_err(|e| AdapterError::Handle(e.to_string()))?;
            info!(
                target: "tracekit::span",
                trace_id = %span.trace_id(),
                span_id = %span.span_id(),
                kind = %span.kind(),
                name = %name,
                duration_ms,
                status,
                error = span.error().as_deref().unwrap_or(""),
                %tags,
                "span finished"
            );
        } else {
            info!(
                target: "tracekit::span",
                trace_id = %span.trace_id(),
                span_id = %span.span_id(),
                kind = %span.kind(),
                name = %name,
                duration_ms,
                status,
                error = span.error().as_deref().unwrap_or(""),
                "span finished"
            );
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanKind;

    #[test]
    fn test_handle_finished_span() {
        let adapter = LogAdapter::new(LogAdapterConfig::default());
        let span = Span::root(SpanKind::Client);
        span.start();
        span.tag("http.method", "GET");
        span.finish();
        assert!(adapter.handle(&span).is_ok());
    }

    #[test]
    fn test_disabled_flag() {
        let adapter = LogAdapter::new(LogAdapterConfig {
            enabled: false,
            include_tags: true,
        });
        assert!(!adapter.enabled());
    }
}
