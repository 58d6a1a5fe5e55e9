use std::time::Duration;

use bytes::Bytes;
use volley_http::{ClientOptions, HttpClient, HttpRequest, HttpTransportErrorKind};
use volley_testserver::TestServer;

fn client() -> HttpClient {
    HttpClient::new(ClientOptions::default()).unwrap_or_else(|e| panic!("client: {e}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_request_dials_and_second_reuses_connection() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("testserver: {e}"));
    let client = client();

    let first = client
        .get(&server.urls().api)
        .await
        .unwrap_or_else(|e| panic!("first request: {e}"));
    assert_eq!(first.status, 200);
    assert!(!first.reused_connection);
    assert_eq!(client.idle_connections(), 1);

    let second = client
        .get(&server.urls().api)
        .await
        .unwrap_or_else(|e| panic!("second request: {e}"));
    assert!(second.reused_connection);
    assert_eq!(second.timings.dns, Duration::ZERO);
    assert_eq!(second.timings.connect, Duration::ZERO);
    assert_eq!(second.timings.tls, Duration::ZERO);

    for t in [first.timings, second.timings] {
        assert_eq!(t.duration, t.sending + t.waiting + t.receiving);
    }

    assert_eq!(server.stats().requests_total(), 2);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_latency_shows_up_as_waiting() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("testserver: {e}"));
    let client = client();

    let res = client
        .get(&format!("{}?ms=80", server.urls().slow))
        .await
        .unwrap_or_else(|e| panic!("request: {e}"));

    assert_eq!(res.status, 200);
    assert_eq!(res.body_utf8(), Some("slow"));
    assert!(
        res.timings.waiting >= Duration::from_millis(70),
        "waiting={:?}",
        res.timings.waiting
    );
    assert!(res.timings.duration >= res.timings.waiting);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn byte_counts_cover_body_and_framing() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("testserver: {e}"));
    let client = client();

    let body = Bytes::from(vec![b'x'; 4096]);
    let req = HttpRequest::post(server.urls().echo.clone(), body)
        .with_header("content-type", "application/json");
    let res = client
        .request(req)
        .await
        .unwrap_or_else(|e| panic!("request: {e}"));

    assert_eq!(res.status, 200);
    assert_eq!(res.body.len(), 4096);
    assert!(res.bytes_sent > 4096, "bytes_sent={}", res.bytes_sent);
    assert!(res.bytes_received > 4096, "bytes_received={}", res.bytes_received);
    assert_eq!(server.stats().saw_json_content_type(), 1);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_timeout_covers_the_whole_exchange() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("testserver: {e}"));
    let client = client();

    let req = HttpRequest::get(format!("{}?ms=500", server.urls().slow))
        .with_timeout(Duration::from_millis(100));
    let err = client.request(req).await.err();

    let kind = err.map(|e| e.transport_error_kind());
    assert_eq!(kind, Some(HttpTransportErrorKind::Timeout));
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_success_status_is_a_response_not_an_error() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("testserver: {e}"));
    let client = client();

    let res = client
        .get(&server.urls().status(503))
        .await
        .unwrap_or_else(|e| panic!("request: {e}"));
    assert_eq!(res.status, 503);
    assert_eq!(res.header("Content-Type"), Some("text/plain; charset=utf-8"));
    server.shutdown().await;
}
