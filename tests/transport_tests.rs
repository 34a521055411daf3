//! Executor and construction tests against an in-memory transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use http::{HeaderMap, HeaderValue, StatusCode};
use opaclient::client::{with_request_builder, with_timeout, with_transport, ClientConfig};
use opaclient::{
    BoxError, Client, ClientBuilder, ClientOption, Context, ContextError, Error, ErrorKind,
    JsonRequestBuilder, Request, RequestBuilder, Response, ResponseBody, Transport,
};
use serde::Deserialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

#[derive(Debug, Deserialize, PartialEq)]
struct Verdict {
    ok: bool,
}

/// A body stream that counts how often it is released.
struct TrackedBody<S> {
    inner: S,
    released: Arc<AtomicUsize>,
}

impl<S> Stream for TrackedBody<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for TrackedBody<S> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct Recorded {
    method: String,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

/// Returns a canned response, or fails, without touching the network.
#[derive(Clone)]
struct FakeTransport {
    status: StatusCode,
    chunks: Vec<std::result::Result<&'static str, &'static str>>,
    failure: Option<&'static str>,
    released: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeTransport {
    fn respond(status: u16, body: &'static str) -> Self {
        Self::chunked(status, vec![Ok(body)])
    }

    fn chunked(status: u16, chunks: Vec<std::result::Result<&'static str, &'static str>>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            chunks,
            failure: None,
            released: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(message: &'static str) -> Self {
        Self {
            failure: Some(message),
            ..Self::respond(200, "")
        }
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn client(&self) -> Client {
        Client::new("http://opa.test:8181/", [with_transport(self.clone())]).unwrap()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn issue(&self, request: Request) -> std::result::Result<Response, BoxError> {
        self.requests.lock().unwrap().push(Recorded {
            method: request.method.to_string(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        if let Some(err) = request.context.err() {
            return Err(err.into());
        }
        if let Some(message) = self.failure {
            return Err(message.into());
        }

        let chunks: Vec<std::result::Result<Bytes, BoxError>> = self
            .chunks
            .iter()
            .map(|chunk| match chunk {
                Ok(text) => Ok(Bytes::from(*text)),
                Err(message) => Err(BoxError::from(*message)),
            })
            .collect();
        let body = TrackedBody {
            inner: stream::iter(chunks),
            released: self.released.clone(),
        };

        Ok(Response::new(
            self.status,
            HeaderMap::new(),
            ResponseBody::from_stream(body),
        ))
    }
}

#[tokio::test]
async fn test_success_decodes_and_releases_once() {
    let transport = FakeTransport::respond(200, r#"{"ok":true}"#);
    let client = transport.client();

    let value: Verdict = client.get(&Context::background(), "/v1/data").await.unwrap();

    assert_eq!(value, Verdict { ok: true });
    assert_eq!(transport.released(), 1);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_not_found_attaches_status_and_body() {
    let transport = FakeTransport::respond(404, "not found");
    let client = transport.client();

    let err = client
        .get::<Verdict>(&Context::background(), "/v1/data")
        .await
        .unwrap_err();

    match &err {
        Error::RequestFailed { status, body, .. } => {
            assert_eq!(*status, Some(StatusCode::NOT_FOUND));
            assert_eq!(body.as_deref(), Some("not found"));
        }
        _ => panic!("Expected RequestFailed, got {:?}", err),
    }
    assert_eq!(transport.released(), 1);
}

#[tokio::test]
async fn test_only_200_is_success() {
    for code in [201u16, 204, 301, 400, 503] {
        let transport = FakeTransport::respond(code, r#"{"ok":true}"#);
        let err = transport
            .client()
            .get::<Verdict>(&Context::background(), "/v1/data")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RequestFailed, "status {}", code);
        assert_eq!(err.status().map(|s| s.as_u16()), Some(code));
        assert_eq!(err.body(), Some(r#"{"ok":true}"#));
        assert_eq!(transport.released(), 1);
    }
}

#[tokio::test]
async fn test_invalid_json_is_unexpected_response() {
    let transport = FakeTransport::respond(200, "not-json");
    let err = transport
        .client()
        .get::<Verdict>(&Context::background(), "/v1/data")
        .await
        .unwrap_err();

    match &err {
        Error::UnexpectedResponse { body, source, .. } => {
            assert_eq!(body.as_deref(), Some("not-json"));
            assert!(source.is_some());
        }
        _ => panic!("Expected UnexpectedResponse, got {:?}", err),
    }
    assert_eq!(transport.released(), 1);
}

#[tokio::test]
async fn test_read_failure_attaches_partial_body() {
    let transport = FakeTransport::chunked(200, vec![Ok(r#"{"ok""#), Err("connection reset")]);
    let err = transport
        .client()
        .get::<Verdict>(&Context::background(), "/v1/data")
        .await
        .unwrap_err();

    match &err {
        Error::UnexpectedResponse { body, source, .. } => {
            assert_eq!(body.as_deref(), Some(r#"{"ok""#));
            let source = source.as_ref().expect("read error is attached");
            assert_eq!(source.to_string(), "connection reset");
        }
        _ => panic!("Expected UnexpectedResponse, got {:?}", err),
    }
    assert_eq!(transport.released(), 1);
}

#[tokio::test]
async fn test_read_failure_on_error_status_is_tolerated() {
    let transport = FakeTransport::chunked(500, vec![Ok("partial"), Err("connection reset")]);
    let err = transport
        .client()
        .get::<Verdict>(&Context::background(), "/v1/data")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RequestFailed);
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.body(), None);
    assert_eq!(transport.released(), 1);
}

#[tokio::test]
async fn test_transport_error_is_request_failed() {
    let transport = FakeTransport::failing("connection refused");
    let err = transport
        .client()
        .get::<Verdict>(&Context::background(), "/v1/data")
        .await
        .unwrap_err();

    match &err {
        Error::RequestFailed {
            status,
            body,
            source,
            ..
        } => {
            assert!(status.is_none());
            assert!(body.is_none());
            assert_eq!(source.as_ref().unwrap().to_string(), "connection refused");
        }
        _ => panic!("Expected RequestFailed, got {:?}", err),
    }
    assert!(!err.is_canceled());
    assert_eq!(transport.released(), 0);
}

#[tokio::test]
async fn test_canceled_context_is_request_failed() {
    let transport = FakeTransport::respond(200, r#"{"ok":true}"#);
    let ctx = Context::background();
    ctx.cancel();

    let err = transport
        .client()
        .get::<Verdict>(&ctx, "/v1/data")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RequestFailed);
    assert!(err.is_canceled());
    assert_eq!(transport.request_count(), 0);
    assert_eq!(transport.released(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_deadline_never_reaches_transport() {
    let transport = FakeTransport::respond(200, r#"{"ok":true}"#);
    let ctx = Context::with_timeout(Duration::from_millis(10));
    tokio::time::advance(Duration::from_millis(20)).await;

    let err = transport
        .client()
        .get::<Verdict>(&ctx, "/v1/data")
        .await
        .unwrap_err();

    match &err {
        Error::RequestFailed { source, .. } => {
            let source = source.as_ref().expect("context error is attached");
            assert_eq!(
                source.downcast_ref::<ContextError>(),
                Some(&ContextError::DeadlineExceeded)
            );
        }
        _ => panic!("Expected RequestFailed, got {:?}", err),
    }
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_invalid_method_never_reaches_transport() {
    let transport = FakeTransport::respond(200, "{}");
    let err = transport
        .client()
        .call::<serde_json::Value>(&Context::background(), "NOT A METHOD", "/v1/data", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_invalid_address_is_invalid_input() {
    let transport = FakeTransport::respond(200, "{}");
    let err = transport
        .client()
        .execute::<serde_json::Value>(&Context::background(), "GET", "::not a url::", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidInput { .. }));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_content_type_only_with_body() {
    let transport = FakeTransport::respond(200, "{}");
    let client = transport.client();
    let ctx = Context::background();

    let _: serde_json::Value = client.get(&ctx, "/v1/data").await.unwrap();
    let _: serde_json::Value = client
        .post(&ctx, "/v1/data/authz", &serde_json::json!({ "input": {} }))
        .await
        .unwrap();

    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests[0].method, "GET");
    assert!(requests[0].headers.get("content-type").is_none());
    assert!(requests[0].body.is_none());

    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].headers["content-type"], "application/json");
    assert_eq!(
        requests[1].body.as_deref(),
        Some(br#"{"input":{}}"#.as_slice())
    );
}

#[tokio::test]
async fn test_path_is_joined_to_trimmed_base() {
    let transport = FakeTransport::respond(200, "{}");
    let client =
        Client::new("http://opa.test:8181///", [with_transport(transport.clone())]).unwrap();
    assert_eq!(client.base_url(), "http://opa.test:8181");

    let _: serde_json::Value = client
        .delete(&Context::background(), "/v1/policies/example")
        .await
        .unwrap();

    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests[0].method, "DELETE");
    assert_eq!(requests[0].url, "http://opa.test:8181/v1/policies/example");
}

fn option(
    apply: impl FnOnce(&mut ClientConfig) -> opaclient::Result<()> + 'static,
) -> Box<dyn ClientOption> {
    Box::new(apply)
}

fn rejected(message: &str) -> Error {
    Error::InvalidInput {
        message: message.to_string(),
        source: None,
    }
}

#[test]
fn test_failing_option_aborts_construction() {
    let later_applied = Arc::new(AtomicBool::new(false));
    let flag = later_applied.clone();

    let options = [
        option(|_| Ok(())),
        option(|_| Err(rejected("first"))),
        option(move |_| {
            flag.store(true, Ordering::SeqCst);
            Err(rejected("second"))
        }),
    ];

    let err = Client::new("http://opa.test", options).unwrap_err();

    match err {
        Error::InvalidInput { message, .. } => assert_eq!(message, "first"),
        other => panic!("Expected InvalidInput, got {:?}", other),
    }
    assert!(!later_applied.load(Ordering::SeqCst));
}

#[test]
fn test_builder_stops_at_first_invalid_option() {
    let err = ClientBuilder::new("http://opa.test")
        .timeout(Duration::ZERO)
        .user_agent("bad\nagent")
        .build()
        .unwrap_err();

    match err {
        Error::InvalidInput { message, .. } => assert!(message.contains("timeout")),
        other => panic!("Expected InvalidInput, got {:?}", other),
    }
}

#[test]
fn test_empty_base_address_is_rejected() {
    for base in ["", "/", "///"] {
        let err = Client::new(base, []).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}

#[test]
fn test_options_see_normalized_base() {
    let seen = Arc::new(Mutex::new(String::new()));
    let sink = seen.clone();
    let record = option(move |config| {
        *sink.lock().unwrap() = config.base_url().to_string();
        Ok(())
    });

    Client::new("http://opa.test/", [with_timeout(Duration::from_secs(1)), record]).unwrap();
    assert_eq!(*seen.lock().unwrap(), "http://opa.test");
}

struct TracingHeaderBuilder;

impl RequestBuilder for TracingHeaderBuilder {
    fn build(
        &self,
        ctx: &Context,
        method: &str,
        url: &str,
        body: Option<Bytes>,
    ) -> opaclient::Result<Request> {
        let mut request = JsonRequestBuilder.build(ctx, method, url, body)?;
        request
            .headers
            .insert("x-request-id", HeaderValue::from_static("req-1"));
        Ok(request)
    }
}

#[tokio::test]
async fn test_custom_request_builder_is_used() {
    let transport = FakeTransport::respond(200, "{}");
    let client = Client::builder("http://opa.test")
        .option(with_request_builder(TracingHeaderBuilder))
        .transport(transport.clone())
        .build()
        .unwrap();

    let _: serde_json::Value = client.get(&Context::background(), "/health").await.unwrap();

    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests[0].headers["x-request-id"], "req-1");
}

#[tokio::test]
async fn test_client_is_shareable_across_tasks() {
    fn assert_send_sync<T: Send + Sync + Clone>() {}
    assert_send_sync::<Client>();

    let transport = FakeTransport::respond(200, r#"{"ok":true}"#);
    let client = transport.client();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get::<Verdict>(&Context::background(), "/v1/data")
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Verdict { ok: true });
    }
    assert_eq!(transport.released(), 8);
    assert_eq!(transport.request_count(), 8);
}
