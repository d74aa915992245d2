//! Instrumented HTTP Client Tests
//!
//! End-to-end behavior against a local mock transport: tag vocabulary,
//! redaction, sizes, naming fallback, and error propagation.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::{started_dispatcher, CollectingAdapter};
use tracekit::adapters::{Adapter, ADAPTER_PROMETHEUS};
use tracekit::annotate::{ANN_REQUEST_HEADERS, ANN_RESPONSE_BODY};
use tracekit::http::{HttpClient, HttpClientError, RequestOptions};
use tracekit::span::TagValue;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_with_collector() -> (HttpClient, Arc<CollectingAdapter>) {
    let collector = CollectingAdapter::new("collector");
    let dispatcher = started_dispatcher(vec![collector.clone() as Arc<dyn Adapter>]).await;
    let client = HttpClient::with_defaults(dispatcher).unwrap();
    (client, collector)
}

fn str_tag(span: &tracekit::span::Span, key: &str) -> String {
    match span.tag_value(key) {
        Some(v) => v.to_string(),
        None => panic!("missing tag {key}"),
    }
}

#[tokio::test]
async fn test_end_to_end_tag_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/y"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let (client, collector) = client_with_collector().await;
    let response = client
        .request("GET", &format!("{}/y", server.uri()), RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_length, Some(5));
    assert_eq!(response.body, Bytes::from_static(b"hello"));

    let spans = collector.spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(str_tag(span, "http.method"), "GET");
    assert_eq!(str_tag(span, "http.host"), "127.0.0.1");
    assert_eq!(str_tag(span, "http.path"), "/y");
    assert_eq!(span.tag_value("http.request.size"), Some(TagValue::Int(0)));
    assert_eq!(span.tag_value("http.response.size"), Some(TagValue::Int(5)));
    assert_eq!(
        span.tag_value("http.status_code"),
        Some(TagValue::Str("200".into()))
    );
}

#[tokio::test]
async fn test_request_size_reflects_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (client, collector) = client_with_collector().await;
    client
        .request(
            "POST",
            &server.uri(),
            RequestOptions {
                body: Some(Bytes::from_static(b"abc")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let span = &collector.spans()[0];
    assert_eq!(span.tag_value("http.request.size"), Some(TagValue::Int(3)));
}

#[tokio::test]
async fn test_naming_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (client, collector) = client_with_collector().await;
    client
        .request("GET", &server.uri(), RequestOptions::default())
        .await
        .unwrap();

    let span = &collector.spans()[0];
    assert_eq!(span.name(), Some("http::out::get (127.0.0.1)".into()));
    assert_eq!(
        span.name_for_adapter(ADAPTER_PROMETHEUS),
        Some("http_out".into())
    );
}

#[tokio::test]
async fn test_sensitive_headers_masked_in_annotations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (client, collector) = client_with_collector().await;
    let mut opts = RequestOptions::default();
    opts.headers
        .insert("Authorization".to_string(), "secretvalue".to_string());
    opts.headers
        .insert("X-Token".to_string(), "secretvalue".to_string());
    opts.headers
        .insert("Accept".to_string(), "text/plain".to_string());
    client.request("GET", &server.uri(), opts).await.unwrap();

    let span = &collector.spans()[0];
    let headers_ann = span
        .annotations()
        .into_iter()
        .find(|a| a.category == ANN_REQUEST_HEADERS)
        .expect("request headers annotation");
    // Header names come from the built transport request, which normalizes
    // them to lowercase.
    assert!(headers_ann.payload.contains("authorization: ***"));
    assert!(headers_ann.payload.contains("x-token: ***"));
    assert!(headers_ann.payload.contains("accept: text/plain"));
    assert!(!headers_ann.payload.contains("secretvalue"));
}

#[tokio::test]
async fn test_secret_query_params_masked_in_url_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (client, collector) = client_with_collector().await;
    client
        .request(
            "GET",
            &format!("{}/q?token=hunter2&page=1", server.uri()),
            RequestOptions::default(),
        )
        .await
        .unwrap();

    let span = &collector.spans()[0];
    let url = str_tag(span, "http.url");
    assert!(url.contains("token=***"));
    assert!(url.contains("page=1"));
    assert!(!url.contains("hunter2"));
}

#[tokio::test]
async fn test_response_body_annotation_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 100]))
        .mount(&server)
        .await;

    let collector = CollectingAdapter::new("collector");
    let dispatcher = started_dispatcher(vec![collector.clone() as Arc<dyn Adapter>]).await;
    let mut config = tracekit::http::HttpClientConfig::default();
    config.capture.max_body_len = 10;
    let client = HttpClient::new(
        dispatcher,
        config,
        tracekit::annotate::SecretMatcher::default(),
    )
    .unwrap();

    client
        .request("GET", &server.uri(), RequestOptions::default())
        .await
        .unwrap();

    let span = &collector.spans()[0];
    let body_ann = span
        .annotations()
        .into_iter()
        .find(|a| a.category == ANN_RESPONSE_BODY)
        .expect("response body annotation");
    assert_eq!(body_ann.payload, format!("{}... [truncated 90 bytes]", "x".repeat(10)));
}

#[tokio::test]
async fn test_transport_error_recorded_and_propagated() {
    let (client, collector) = client_with_collector().await;
    // Nothing listens on this port.
    let err = client
        .request(
            "GET",
            "http://127.0.0.1:1/unreachable",
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HttpClientError::Transport(_)));

    let spans = collector.spans();
    assert_eq!(spans.len(), 1, "failed call still produces a finished span");
    assert!(spans[0].error().is_some());
}

#[tokio::test]
async fn test_capture_disabled_skips_annotations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .mount(&server)
        .await;

    let collector = CollectingAdapter::new("collector");
    let dispatcher = started_dispatcher(vec![collector.clone() as Arc<dyn Adapter>]).await;
    let mut config = tracekit::http::HttpClientConfig::default();
    config.capture.request_headers = false;
    config.capture.request_body = false;
    config.capture.response_headers = false;
    config.capture.response_body = false;
    let client = HttpClient::new(
        dispatcher,
        config,
        tracekit::annotate::SecretMatcher::default(),
    )
    .unwrap();

    client
        .request("GET", &server.uri(), RequestOptions::default())
        .await
        .unwrap();

    assert!(collector.spans()[0].annotations().is_empty());
}
