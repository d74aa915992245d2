//! HTTP span vocabulary and naming policy
//!
//! Standard tag keys for network-call spans plus the deterministic fallback
//! naming applied at finish time when the call site never set an explicit
//! name:
//!
//! | Tag | Value | Example |
//! |-----|-------|---------|
//! | `http.url` | URL with secret query params masked | `https://x/y?token=***` |
//! | `http.host` | host | `api.example.com` |
//! | `http.method` | method | `GET` |
//! | `http.path` | path | `/y` |
//! | `http.request.size` | request body bytes, 0 when absent | `0` |
//! | `http.response.size` | transport-reported content length | `5` |
//! | `http.status_code` | status code as a string | `"200"` |
//!
//! Fallback name: `http::<direction>::<method lowercased>`, suffixed with
//! ` (<host>)` when the host is known — e.g. `http::out::get (example.com)`.

use std::collections::BTreeMap;

use crate::adapters::ADAPTER_PROMETHEUS;
use crate::annotate::{SecretMatcher, MASK};
use crate::span::{Span, TagValue};

mod client;

pub use client::{
    HttpClient, HttpClientConfig, HttpClientError, HttpResponse, RequestOptions,
};

pub const TAG_HTTP_URL: &str = "http.url";
pub const TAG_HTTP_HOST: &str = "http.host";
pub const TAG_HTTP_METHOD: &str = "http.method";
pub const TAG_HTTP_PATH: &str = "http.path";
pub const TAG_HTTP_REQUEST_SIZE: &str = "http.request.size";
pub const TAG_HTTP_RESPONSE_SIZE: &str = "http.response.size";
pub const TAG_HTTP_STATUS_CODE: &str = "http.status_code";

/// Which side of the network call the span describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpDirection {
    In,
    Out,
}

impl HttpDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpDirection::In => "in",
            HttpDirection::Out => "out",
        }
    }

    /// Low-cardinality display name for metrics sinks.
    fn metrics_name(&self) -> &'static str {
        match self {
            HttpDirection::In => "http_in",
            HttpDirection::Out => "http_out",
        }
    }
}

fn fallback_name(direction: HttpDirection, tags: &BTreeMap<String, TagValue>) -> String {
    let mut name = format!("http::{}", direction.as_str());
    if let Some(TagValue::Str(method)) = tags.get(TAG_HTTP_METHOD) {
        name.push_str("::");
        name.push_str(&method.to_lowercase());
    }
    if let Some(TagValue::Str(host)) = tags.get(TAG_HTTP_HOST) {
        name.push_str(&format!(" ({})", host));
    }
    name
}

/// Install the HTTP naming policy on a span: the deterministic fallback name
/// derived from method/host tags, plus the `http_in`/`http_out` display name
/// for the metrics sink.
pub fn apply_http_naming(span: &Span, direction: HttpDirection) {
    span.set_name_fallback(move |tags| fallback_name(direction, tags));
    span.set_name_for_adapter(ADAPTER_PROMETHEUS, direction.metrics_name());
}

/// Render `url` with the values of secret query parameters masked.
pub fn mask_url(url: &reqwest::Url, secrets: &SecretMatcher) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if secrets.is_secret(&k) {
                MASK.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    let mut masked = url.clone();
    masked
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    masked.to_string()
}
