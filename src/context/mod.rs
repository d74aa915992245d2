//! Task-local context propagation and the span-scoping wrapper
//!
//! Each tokio task owns its own "current span" slot; suspension of one task
//! never exposes or corrupts another task's span. Nesting follows stack
//! discipline: entering a scope shadows the outer span for the duration of
//! the inner future and the outer span is visible again on every exit path.
//!
//! [`span_scope`] is the higher-order wrapper that ties it all together: it
//! opens a child span of the current one, makes it ambient, runs the wrapped
//! operation, and guarantees the span is finished exactly once — on normal
//! return, on error, and on cancellation (the wrapper future being dropped
//! mid-flight).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tracekit::context::{current, span_scope};
//! use tracekit::dispatch::Dispatcher;
//! use tracekit::span::SpanKind;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dispatcher = Arc::new(Dispatcher::new());
//! let out: Result<u32, anyhow::Error> =
//!     span_scope(&dispatcher, SpanKind::Client, |span| async move {
//!         span.set_name("fetch-user");
//!         assert_eq!(current().unwrap().span_id(), span.span_id());
//!         Ok(42)
//!     })
//!     .await;
//! assert_eq!(out?, 42);
//! assert!(current().is_none());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::span::{Span, SpanKind};

tokio::task_local! {
    static CURRENT_SPAN: Span;
}

/// Error text recorded when the wrapped operation is cancelled before
/// completing.
pub const CANCELLED: &str = "operation cancelled";

/// The currently ambient span, if any. Never panics: outside of any scope
/// this returns `None`.
pub fn current() -> Option<Span> {
    CURRENT_SPAN.try_with(|s| s.clone()).ok()
}

/// Run `fut` with `span` as the ambient span. The prior value is restored on
/// every exit path, including panic and cancellation.
pub async fn scope<F: Future>(span: Span, fut: F) -> F::Output {
    CURRENT_SPAN.scope(span, fut).await
}

/// Finishes the span on drop unless disarmed; this is what makes the
/// wrapper's exactly-once guarantee hold under cancellation, where the
/// composed future is dropped without ever reaching the explicit finish.
struct FinishGuard {
    span: Span,
    armed: bool,
}

impl FinishGuard {
    fn new(span: Span) -> Self {
        Self { span, armed: true }
    }

    fn finish(mut self, error: Option<String>) {
        self.armed = false;
        self.span.finish_with(None, error);
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.armed {
            self.span.finish_with(None, Some(CANCELLED.to_string()));
        }
    }
}

/// Wrap an operation in a new span that is always properly closed.
///
/// The span is created as a child of [`current`] (or as a trace root when
/// there is none), started, made ambient for the duration of the operation,
/// and finished exactly once:
///
/// - normal return: finished without error, result propagated unchanged;
/// - error return: finished with the error's `Display` rendering, then the
///   error is propagated unchanged — tracing never masks the original
///   failure;
/// - cancellation: finished with [`CANCELLED`] before the drop completes.
///
/// Span kind (and any domain-specific naming, via the handle passed to `f`)
/// is chosen by the call site.
pub async fn span_scope<F, Fut, T, E>(
    dispatcher: &Arc<Dispatcher>,
    kind: SpanKind,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(Span) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let span = Span::new(kind, current().as_ref(), Some(dispatcher.clone()));
    span.start();
    let guard = FinishGuard::new(span.clone());
    let result = CURRENT_SPAN.scope(span.clone(), f(span)).await;
    match &result {
        Ok(_) => guard.finish(None),
        Err(e) => guard.finish(Some(e.to_string())),
    }
    result
}
