//! Span: the unit of instrumentation
//!
//! A [`Span`] measures one logical operation: it carries identity (trace id,
//! span id, optional parent), a kind, string/integer tags, ordered
//! annotations, and a start/finish lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! New ──start()──► Started ──finish()──► Finished
//! ```
//!
//! `finish` is idempotent: the first call resolves the span name, records the
//! optional error, computes the duration, and hands the span to its
//! dispatcher exactly once. Later calls (defensive double-close in cleanup
//! paths) are no-ops. Mutations after finish log a warning and do nothing.
//!
//! # Example
//!
//! ```
//! use tracekit::span::{Span, SpanKind, TagValue};
//!
//! let span = Span::root(SpanKind::Client);
//! span.start();
//! span.tag("http.method", "GET");
//! span.tag("http.request.size", 0i64);
//! span.finish();
//!
//! assert!(span.is_finished());
//! assert_eq!(span.tag_value("http.method"), Some(TagValue::Str("GET".into())));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dispatch::Dispatcher;

/// Span kind, mirroring the conventional tracing vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Server,
    Client,
    Producer,
    Consumer,
    Unspecified,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Server => "server",
            SpanKind::Client => "client",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
            SpanKind::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    /// Constructed, not yet exposed via context propagation.
    New,
    /// Exposed and accepting tags/annotations.
    Started,
    /// Terminal; immutable.
    Finished,
}

/// A tag value: string or integer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Int(i64),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<usize> for TagValue {
    fn from(v: usize) -> Self {
        TagValue::Int(v as i64)
    }
}

/// A timestamped, unstructured record attached to a span.
///
/// Annotations are stored in call order, not timestamp order: callers may
/// backdate `ts` to the network event the record corresponds to (e.g. the
/// moment request headers were sent).
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub category: String,
    pub payload: String,
    pub ts: DateTime<Utc>,
}

/// Fallback naming policy, applied at finish time when no explicit name was
/// set. Receives the final tag map so domain layers (HTTP, messaging) can
/// derive a name from what was recorded.
pub type NameFallback = Box<dyn Fn(&BTreeMap<String, TagValue>) -> String + Send + Sync>;

const UNNAMED: &str = "unnamed";

struct SpanInner {
    state: SpanState,
    name: Option<String>,
    name_fallback: Option<NameFallback>,
    adapter_names: HashMap<String, String>,
    tags: BTreeMap<String, TagValue>,
    annotations: Vec<Annotation>,
    start: DateTime<Utc>,
    finish: Option<DateTime<Utc>>,
    error: Option<String>,
    dispatcher: Option<Arc<Dispatcher>>,
}

struct SpanShared {
    trace_id: String,
    span_id: String,
    parent_id: Option<String>,
    kind: SpanKind,
    inner: Mutex<SpanInner>,
}

/// Cheaply cloneable handle to one measured unit of work.
///
/// All clones refer to the same underlying span; interior state is guarded by
/// a mutex so the handle can be shared between the task-local context slot,
/// the scoping wrapper and adapters.
#[derive(Clone)]
pub struct Span {
    shared: Arc<SpanShared>,
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

impl Span {
    /// Create a span. `parent` links trace identity; `dispatcher` receives the
    /// span at finish time (a span without one is never delivered anywhere,
    /// which is what unit tests want).
    pub fn new(
        kind: SpanKind,
        parent: Option<&Span>,
        dispatcher: Option<Arc<Dispatcher>>,
    ) -> Self {
        let (trace_id, parent_id) = match parent {
            Some(p) => (p.trace_id().to_string(), Some(p.span_id().to_string())),
            None => (new_trace_id(), None),
        };
        Span {
            shared: Arc::new(SpanShared {
                trace_id,
                span_id: new_span_id(),
                parent_id,
                kind,
                inner: Mutex::new(SpanInner {
                    state: SpanState::New,
                    name: None,
                    name_fallback: None,
                    adapter_names: HashMap::new(),
                    tags: BTreeMap::new(),
                    annotations: Vec::new(),
                    start: Utc::now(),
                    finish: None,
                    error: None,
                    dispatcher,
                }),
            }),
        }
    }

    /// Root span with no parent and no dispatcher.
    pub fn root(kind: SpanKind) -> Self {
        Span::new(kind, None, None)
    }

    /// Child span sharing this span's trace id; no dispatcher.
    pub fn child(&self, kind: SpanKind) -> Self {
        Span::new(kind, Some(self), None)
    }

    pub fn trace_id(&self) -> &str {
        &self.shared.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.shared.span_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.shared.parent_id.as_deref()
    }

    pub fn kind(&self) -> SpanKind {
        self.shared.kind
    }

    pub fn state(&self) -> SpanState {
        self.shared.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == SpanState::Finished
    }

    /// Mark the span started. Called by the scoping wrapper just before the
    /// span becomes ambient; `ts` defaults to now.
    pub fn start(&self) {
        self.start_at(Utc::now());
    }

    pub fn start_at(&self, ts: DateTime<Utc>) {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            SpanState::New => {
                inner.start = ts;
                inner.state = SpanState::Started;
            }
            _ => warn!(
                span_id = %self.shared.span_id,
                "start() on a span that is not New; ignoring"
            ),
        }
    }

    /// Set or overwrite a tag. Last write wins. After finish this is a
    /// warning no-op.
    pub fn tag(&self, key: impl Into<String>, value: impl Into<TagValue>) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SpanState::Finished {
            warn!(span_id = %self.shared.span_id, "tag() after finish; ignoring");
            return;
        }
        inner.tags.insert(key.into(), value.into());
    }

    /// Append an annotation timestamped now.
    pub fn annotate(&self, category: impl Into<String>, payload: impl Into<String>) {
        self.annotate_at(category, payload, Utc::now());
    }

    /// Append an annotation with an explicit (possibly backdated) timestamp.
    pub fn annotate_at(
        &self,
        category: impl Into<String>,
        payload: impl Into<String>,
        ts: DateTime<Utc>,
    ) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SpanState::Finished {
            warn!(span_id = %self.shared.span_id, "annotate() after finish; ignoring");
            return;
        }
        inner.annotations.push(Annotation {
            category: category.into(),
            payload: payload.into(),
            ts,
        });
    }

    /// Set the human-readable name. Overrides any fallback policy.
    pub fn set_name(&self, name: impl Into<String>) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SpanState::Finished {
            warn!(span_id = %self.shared.span_id, "set_name() after finish; ignoring");
            return;
        }
        inner.name = Some(name.into());
    }

    /// Install the fallback naming policy evaluated at finish time when no
    /// explicit name was set. Domain layers compose naming this way instead
    /// of subclassing the span.
    pub fn set_name_fallback(
        &self,
        fallback: impl Fn(&BTreeMap<String, TagValue>) -> String + Send + Sync + 'static,
    ) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SpanState::Finished {
            return;
        }
        inner.name_fallback = Some(Box::new(fallback));
    }

    /// Set a sink-specific display name, so cardinality-sensitive sinks
    /// (metrics) can group spans differently than log-oriented sinks.
    pub fn set_name_for_adapter(&self, adapter: impl Into<String>, name: impl Into<String>) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SpanState::Finished {
            return;
        }
        inner.adapter_names.insert(adapter.into(), name.into());
    }

    /// Finish now, without an error.
    pub fn finish(&self) {
        self.finish_with(None, None);
    }

    /// Finish the span: resolve the name, record the optional error, compute
    /// the duration and deliver to the dispatcher. Idempotent.
    pub fn finish_with(&self, ts: Option<DateTime<Utc>>, error: Option<String>) {
        let dispatcher = {
            let mut inner = self.shared.inner.lock();
            if inner.state == SpanState::Finished {
                warn!(span_id = %self.shared.span_id, "finish() called twice; ignoring");
                return;
            }
            if inner.name.is_none() {
                inner.name = Some(match inner.name_fallback.take() {
                    Some(fallback) => fallback(&inner.tags),
                    None => UNNAMED.to_string(),
                });
            }
            inner.finish = Some(ts.unwrap_or_else(Utc::now));
            inner.error = error;
            inner.state = SpanState::Finished;
            inner.dispatcher.take()
        };
        // Lock released before fan-out so adapters can read the span freely.
        if let Some(dispatcher) = dispatcher {
            dispatcher.dispatch(self);
        }
    }

    /// Resolved name. `None` until finish unless explicitly set earlier.
    pub fn name(&self) -> Option<String> {
        self.shared.inner.lock().name.clone()
    }

    /// Sink-specific display name registered for `adapter`, if any.
    pub fn name_for_adapter(&self, adapter: &str) -> Option<String> {
        self.shared.inner.lock().adapter_names.get(adapter).cloned()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.shared.inner.lock().start
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.shared.inner.lock().finish
    }

    /// Finish minus start; `None` until finished.
    pub fn duration(&self) -> Option<Duration> {
        let inner = self.shared.inner.lock();
        inner.finish.map(|f| f - inner.start)
    }

    pub fn error(&self) -> Option<String> {
        self.shared.inner.lock().error.clone()
    }

    pub fn tag_value(&self, key: &str) -> Option<TagValue> {
        self.shared.inner.lock().tags.get(key).cloned()
    }

    /// Snapshot of the tag map.
    pub fn tags(&self) -> BTreeMap<String, TagValue> {
        self.shared.inner.lock().tags.clone()
    }

    /// Snapshot of the annotation list, in call order.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.shared.inner.lock().annotations.clone()
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("trace_id", &self.shared.trace_id)
            .field("span_id", &self.shared.span_id)
            .field("parent_id", &self.shared.parent_id)
            .field("kind", &self.shared.kind)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_shapes() {
        let span = Span::root(SpanKind::Client);
        assert_eq!(span.trace_id().len(), 32);
        assert_eq!(span.span_id().len(), 16);
        assert!(span.trace_id().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(span.parent_id().is_none());
    }

    #[test]
    fn test_child_links_parent() {
        let root = Span::root(SpanKind::Server);
        let child = root.child(SpanKind::Client);
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_id(), Some(root.span_id()));
        assert_ne!(child.span_id(), root.span_id());
    }

    #[test]
    fn test_tag_last_write_wins() {
        let span = Span::root(SpanKind::Unspecified);
        span.start();
        span.tag("http.method", "GET");
        span.tag("http.method", "PUT");
        assert_eq!(
            span.tag_value("http.method"),
            Some(TagValue::Str("PUT".into()))
        );
    }

    #[test]
    fn test_tag_after_finish_is_noop() {
        let span = Span::root(SpanKind::Unspecified);
        span.start();
        span.finish();
        span.tag("late", 1i64);
        assert!(span.tag_value("late").is_none());
    }

    #[test]
    fn test_annotations_keep_call_order() {
        let span = Span::root(SpanKind::Unspecified);
        span.start();
        let backdated = Utc::now() - Duration::seconds(10);
        span.annotate("first", "a");
        span.annotate_at("second", "b", backdated);
        let anns = span.annotations();
        assert_eq!(anns[0].category, "first");
        assert_eq!(anns[1].category, "second");
        assert_eq!(anns[1].ts, backdated);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let span = Span::root(SpanKind::Unspecified);
        span.start();
        span.finish_with(None, Some("boom".into()));
        let first_finish = span.finished_at();
        span.finish();
        assert_eq!(span.finished_at(), first_finish);
        assert_eq!(span.error(), Some("boom".into()));
    }

    #[test]
    fn test_explicit_name_wins_over_fallback() {
        let span = Span::root(SpanKind::Unspecified);
        span.start();
        span.set_name_fallback(|_| "fallback".into());
        span.set_name("explicit");
        span.finish();
        assert_eq!(span.name(), Some("explicit".into()));
    }

    #[test]
    fn test_fallback_sees_final_tags() {
        let span = Span::root(SpanKind::Client);
        span.start();
        span.set_name_fallback(|tags| {
            format!(
                "op::{}",
                tags.get("http.method")
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            )
        });
        span.tag("http.method", "GET");
        span.finish();
        assert_eq!(span.name(), Some("op::GET".into()));
    }

    #[test]
    fn test_unnamed_fallback() {
        let span = Span::root(SpanKind::Unspecified);
        span.start();
        span.finish();
        assert_eq!(span.name(), Some("unnamed".into()));
    }

    #[test]
    fn test_backdated_finish_duration() {
        let span = Span::root(SpanKind::Unspecified);
        let start = Utc::now();
        span.start_at(start);
        span.finish_with(Some(start + Duration::milliseconds(250)), None);
        assert_eq!(span.duration(), Some(Duration::milliseconds(250)));
    }

    #[test]
    fn test_adapter_specific_name() {
        let span = Span::root(SpanKind::Client);
        span.start();
        span.set_name_for_adapter("prometheus", "http_out");
        span.finish();
        assert_eq!(span.name_for_adapter("prometheus"), Some("http_out".into()));
        assert_eq!(span.name_for_adapter("log"), None);
    }
}
