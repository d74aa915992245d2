//! Instrumented HTTP client
//!
//! Wraps a `reqwest` transport so that every outbound call runs inside its
//! own span: URL/host/method/path/size tags, header and body annotations
//! timestamped at the network events, status and response size recorded from
//! the transport, and the deterministic `http::out::<method>` naming
//! fallback. Transport failures are recorded on the span and then propagated
//! unchanged.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    apply_http_naming, mask_url, HttpDirection, TAG_HTTP_HOST, TAG_HTTP_METHOD, TAG_HTTP_PATH,
    TAG_HTTP_REQUEST_SIZE, TAG_HTTP_RESPONSE_SIZE, TAG_HTTP_STATUS_CODE, TAG_HTTP_URL,
};
use crate::annotate::{Annotator, CaptureConfig, SecretMatcher};
use crate::context::{self, span_scope};
use crate::dispatch::Dispatcher;
use crate::span::SpanKind;

/// Errors from the instrumented client.
#[derive(Error, Debug)]
pub enum HttpClientError {
    /// Usage error: the unwrapped entry point was invoked with no ambient
    /// span in scope. Indicates a programming error in the calling code.
    #[error("no active span in scope; use `request` or enter a span scope first")]
    NoActiveSpan,

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Instrumented-client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Span kind for outbound call spans. Explicit configuration rather than
    /// a hard-coded mapping.
    #[serde(default = "default_span_kind")]
    pub span_kind: SpanKind,
    /// Default request timeout in seconds; `None` means no timeout.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Capture switches and body size bound for annotations.
    #[serde(default)]
    pub capture: CaptureConfig,
}

fn default_span_kind() -> SpanKind {
    SpanKind::Client
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            span_kind: SpanKind::Client,
            timeout_seconds: None,
            capture: CaptureConfig::default(),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<Bytes>,
    pub headers: HashMap<String, String>,
    /// Overrides the client-level timeout for this request.
    pub timeout: Option<Duration>,
}

/// Response as observed through the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Transport-reported content length; may be unknown.
    pub content_length: Option<u64>,
    pub body: Bytes,
}

/// HTTP client that traces every request in its own span.
pub struct HttpClient {
    dispatcher: Arc<Dispatcher>,
    client: reqwest::Client,
    config: HttpClientConfig,
    annotator: Annotator,
}

impl HttpClient {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        config: HttpClientConfig,
        secrets: SecretMatcher,
    ) -> Result<Self, HttpClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        let annotator = Annotator::new(config.capture.clone(), secrets);
        Ok(Self {
            dispatcher,
            client,
            config,
            annotator,
        })
    }

    /// Convenience constructor with default config and secret words.
    pub fn with_defaults(dispatcher: Arc<Dispatcher>) -> Result<Self, HttpClientError> {
        Self::new(dispatcher, HttpClientConfig::default(), SecretMatcher::default())
    }

    /// Perform `method url` inside a freshly opened span.
    ///
    /// The span is a child of the caller's ambient span (if any), carries the
    /// configured [`SpanKind`], and is finished on every exit path — success,
    /// transport error, or cancellation.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        opts: RequestOptions,
    ) -> Result<HttpResponse, HttpClientError> {
        span_scope(&self.dispatcher, self.config.span_kind, |_span| {
            self.request_in_span(method, url, opts)
        })
        .await
    }

    /// The unwrapped entry point, for callers that manage their own span
    /// scope. Fails with [`HttpClientError::NoActiveSpan`] when no ambient
    /// span is present.
    pub async fn request_in_span(
        &self,
        method: &str,
        url: &str,
        opts: RequestOptions,
    ) -> Result<HttpResponse, HttpClientError> {
        let span = context::current().ok_or(HttpClientError::NoActiveSpan)?;
        apply_http_naming(&span, HttpDirection::Out);

        let url: reqwest::Url = url
            .parse()
            .map_err(|e| HttpClientError::InvalidUrl(format!("{e}")))?;
        let method_parsed = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| HttpClientError::InvalidMethod(method.to_string()))?;

        span.tag(TAG_HTTP_URL, mask_url(&url, self.annotator.secrets()));
        if let Some(host) = url.host_str() {
            span.tag(TAG_HTTP_HOST, host);
        }
        span.tag(TAG_HTTP_METHOD, method);
        span.tag(TAG_HTTP_PATH, url.path());
        span.tag(
            TAG_HTTP_REQUEST_SIZE,
            opts.body.as_ref().map(|b| b.len()).unwrap_or(0),
        );

        let mut builder = self.client.request(method_parsed, url);
        builder = builder.headers(build_header_map(&opts.headers)?);
        if let Some(body) = opts.body.clone() {
            builder = builder.body(body);
        }
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }

        // Annotate the headers the transport actually carries, not just the
        // caller-supplied set (the built request includes client defaults).
        let request = builder.build()?;
        let sent_headers = flatten_headers(request.headers());

        // The transport error path returns here with the span still open; the
        // scoping wrapper records the error and finishes the span.
        let sent_at = Utc::now();
        let response = self.client.execute(request).await?;
        let received_at = Utc::now();

        self.annotator.request_headers(&span, &sent_headers, sent_at);
        self.annotator
            .request_body(&span, opts.body.as_deref(), sent_at);

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let resp_headers = flatten_headers(response.headers());
        self.annotator
            .response_headers(&span, &resp_headers, received_at);

        let body = response.bytes().await?;
        self.annotator.response_body(&span, &body, received_at);

        if let Some(len) = content_length {
            span.tag(TAG_HTTP_RESPONSE_SIZE, len);
        }
        span.tag(TAG_HTTP_STATUS_CODE, status.to_string());

        Ok(HttpResponse {
            status,
            headers: resp_headers,
            content_length,
            body,
        })
    }
}

fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, HttpClientError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_str(name)
            .map_err(|_| HttpClientError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| HttpClientError::InvalidHeader(name.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
