//! Shared test adapters.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracekit::adapters::{Adapter, AdapterError};
use tracekit::dispatch::Dispatcher;
use tracekit::span::Span;

/// Collects every span it receives.
pub struct CollectingAdapter {
    name: String,
    spans: Mutex<Vec<Span>>,
}

impl CollectingAdapter {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            spans: Mutex::new(Vec::new()),
        })
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().clone()
    }
}

#[async_trait]
impl Adapter for CollectingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn start(&self, _dispatcher: &Dispatcher) -> Result<(), AdapterError> {
        Ok(())
    }

    fn handle(&self, span: &Span) -> Result<(), AdapterError> {
        self.spans.lock().push(span.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Fails every `handle` call.
pub struct FailingAdapter;

impl FailingAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Adapter for FailingAdapter {
    fn name(&self) -> &str {
        "failing"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn start(&self, _dispatcher: &Dispatcher) -> Result<(), AdapterError> {
        Ok(())
    }

    fn handle(&self, _span: &Span) -> Result<(), AdapterError> {
        Err(AdapterError::Handle("sink is broken".into()))
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Dispatcher with the given adapters registered and started.
pub async fn started_dispatcher(
    adapters: Vec<Arc<dyn Adapter>>,
) -> Arc<Dispatcher> {
    let mut dispatcher = Dispatcher::new();
    for adapter in adapters {
        dispatcher.register(adapter).unwrap();
    }
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start().await.unwrap();
    dispatcher
}
