//! Safe capture of request/response metadata
//!
//! The [`Annotator`] records headers and bodies onto a span while protecting
//! sensitive data and bounding size:
//!
//! - header (and query parameter) names are tested against a pluggable
//!   case-insensitive [`SecretMatcher`]; matches are recorded as the fixed
//!   [`MASK`] instead of the raw value;
//! - each capture category (request/response × headers/body) is
//!   independently switchable and skipped entirely when disabled;
//! - bodies longer than `max_body_len` are truncated with an explicit
//!   truncation marker, never silently dropped or recorded in full;
//! - annotations carry the timestamp of the network event they correspond
//!   to, supplied by the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Fixed mask recorded in place of a sensitive value.
pub const MASK: &str = "***";

/// Annotation categories used for captured HTTP metadata.
pub const ANN_REQUEST_HEADERS: &str = "request_headers";
pub const ANN_REQUEST_BODY: &str = "request_body";
pub const ANN_RESPONSE_HEADERS: &str = "response_headers";
pub const ANN_RESPONSE_BODY: &str = "response_body";

/// Pluggable predicate over field names deciding what gets masked.
///
/// The default matches case-insensitive variants of password, passphrase,
/// pwd, token and secret. Deployments with stricter compliance policies can
/// supply their own predicate via [`SecretMatcher::from_fn`].
#[derive(Clone)]
pub struct SecretMatcher {
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl SecretMatcher {
    /// Default word list covering the usual suspects: password variants,
    /// passphrase, pwd, token, secret and authorization.
    pub fn default_words() -> Self {
        let re = regex_lite::Regex::new(
            r"(?i)(pas+wo?r?d|pass(phrase)?|pwd|token|secrete?|authorization)",
        )
        .expect("secret-word regex is valid");
        Self {
            predicate: Arc::new(move |name| re.is_match(name)),
        }
    }

    /// Build a matcher from an arbitrary predicate over field names.
    pub fn from_fn(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(f),
        }
    }

    pub fn is_secret(&self, name: &str) -> bool {
        (self.predicate)(name)
    }
}

impl Default for SecretMatcher {
    fn default() -> Self {
        Self::default_words()
    }
}

impl fmt::Debug for SecretMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMatcher").finish_non_exhaustive()
    }
}

/// Per-call-site capture switches and the body size bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_true")]
    pub request_headers: bool,
    #[serde(default = "default_true")]
    pub request_body: bool,
    #[serde(default = "default_true")]
    pub response_headers: bool,
    #[serde(default = "default_true")]
    pub response_body: bool,
    /// Maximum recorded body length in bytes.
    #[serde(default = "default_max_body_len")]
    pub max_body_len: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_body_len() -> usize {
    65536
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            request_headers: true,
            request_body: true,
            response_headers: true,
            response_body: true,
            max_body_len: default_max_body_len(),
        }
    }
}

/// Records request/response metadata onto spans with redaction and size
/// limits applied.
#[derive(Debug, Clone)]
pub struct Annotator {
    capture: CaptureConfig,
    secrets: SecretMatcher,
}

impl Annotator {
    pub fn new(capture: CaptureConfig, secrets: SecretMatcher) -> Self {
        Self { capture, secrets }
    }

    pub fn secrets(&self) -> &SecretMatcher {
        &self.secrets
    }

    pub fn capture(&self) -> &CaptureConfig {
        &self.capture
    }

    /// Record request headers with `ts` = the time the request was sent.
    pub fn request_headers(
        &self,
        span: &Span,
        headers: &HashMap<String, String>,
        ts: DateTime<Utc>,
    ) {
        if !self.capture.request_headers {
            return;
        }
        span.annotate_at(ANN_REQUEST_HEADERS, self.render_headers(headers), ts);
    }

    /// Record the request body with `ts` = the time the request was sent.
    pub fn request_body(&self, span: &Span, body: Option<&[u8]>, ts: DateTime<Utc>) {
        if !self.capture.request_body {
            return;
        }
        if let Some(body) = body {
            span.annotate_at(ANN_REQUEST_BODY, self.render_body(body), ts);
        }
    }

    /// Record response headers with `ts` = the time they were received.
    pub fn response_headers(
        &self,
        span: &Span,
        headers: &HashMap<String, String>,
        ts: DateTime<Utc>,
    ) {
        if !self.capture.response_headers {
            return;
        }
        span.annotate_at(ANN_RESPONSE_HEADERS, self.render_headers(headers), ts);
    }

    /// Record the response body with `ts` = the time it was received.
    pub fn response_body(&self, span: &Span, body: &[u8], ts: DateTime<Utc>) {
        if !self.capture.response_body {
            return;
        }
        span.annotate_at(ANN_RESPONSE_BODY, self.render_body(body), ts);
    }

    fn render_headers(&self, headers: &HashMap<String, String>) -> String {
        let mut lines: Vec<String> = headers
            .iter()
            .map(|(name, value)| {
                if self.secrets.is_secret(name) {
                    format!("{}: {}", name, MASK)
                } else {
                    format!("{}: {}", name, value)
                }
            })
            .collect();
        // HashMap iteration order is unstable; sort for deterministic output.
        lines.sort();
        lines.join("\n")
    }

    fn render_body(&self, body: &[u8]) -> String {
        let limit = self.capture.max_body_len;
        if body.len() <= limit {
            String::from_utf8_lossy(body).into_owned()
        } else {
            let mut rendered = String::from_utf8_lossy(&body[..limit]).into_owned();
            rendered.push_str(&format!("... [truncated {} bytes]", body.len() - limit));
            rendered
        }
    }
}
