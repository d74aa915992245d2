//! Metrics sink: span durations and error counts per span display name.
//!
//! Grouping uses the sink-specific display name when the span set one (see
//! [`Span::name_for_adapter`]), falling back to the resolved span name. The
//! HTTP layer registers low-cardinality names such as `http_out` for exactly
//! this reason.

use async_trait::async_trait;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use serde::{Deserialize, Serialize};

use super::{Adapter, AdapterError, ADAPTER_PROMETHEUS};
use crate::dispatch::Dispatcher;
use crate::span::Span;

/// Prometheus adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusAdapterConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Histogram buckets in seconds.
    #[serde(default = "default_buckets")]
    pub buckets: Vec<f64>,
}

fn default_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
}

impl Default for PrometheusAdapterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buckets: default_buckets(),
        }
    }
}

/// Records each finished span into a duration histogram and, when the span
/// carries an error, an error counter. Owns its own [`Registry`] so multiple
/// dispatchers (or tests) never collide on global metric registration.
pub struct PrometheusAdapter {
    cfg: PrometheusAdapterConfig,
    registry: Registry,
    durations: HistogramVec,
    errors: IntCounterVec,
}

impl PrometheusAdapter {
    pub fn new(cfg: PrometheusAdapterConfig) -> Result<Self, AdapterError> {
        let registry = Registry::new();
        let durations = HistogramVec::new(
            HistogramOpts::new("tracekit_span_duration_seconds", "Span duration in seconds")
                .buckets(cfg.buckets.clone()),
            &["name"],
        )
        .map_err(|e| AdapterError::Config(e.to_string()))?;
        let errors = IntCounterVec::new(
            Opts::new("tracekit_span_errors_total", "Spans finished with an error"),
            &["name"],
        )
        .map_err(|e| AdapterError::Config(e.to_string()))?;
        registry
            .register(Box::new(durations.clone()))
            .map_err(|e| AdapterError::Config(e.to_string()))?;
        registry
            .register(Box::new(errors.clone()))
            .map_err(|e| AdapterError::Config(e.to_string()))?;
        Ok(Self {
            cfg,
            registry,
            durations,
            errors,
        })
    }

    /// Registry backing this adapter, for scraping/encoding.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn display_name(&self, span: &Span) -> String {
        span.name_for_adapter(ADAPTER_PROMETHEUS)
            .or_else(|| span.name())
            .unwrap_or_else(|| "unnamed".to_string())
    }
}

#[async_trait]
impl Adapter for PrometheusAdapter {
    fn name(&self) -> &str {
        ADAPTER_PROMETHEUS
    }

    fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    async fn start(&self, _dispatcher: &Dispatcher) -> Result<(), AdapterError> {
        Ok(())
    }

    fn handle(&self, span: &Span) -> Result<(), AdapterError> {
        let name = self.display_name(span);
        let seconds = span
            .duration()
            .map(|d| d.num_microseconds().unwrap_or_default() as f64 / 1_000_000.0)
            .unwrap_or_default();
        self.durations.with_label_values(&[&name]).observe(seconds);
        if span.error().is_some() {
            self.errors.with_label_values(&[&name]).inc();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}
