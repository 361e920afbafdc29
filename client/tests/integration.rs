//! End-to-end requests against the live axum mock server.
//!
//! # Design
//! Starts the mock server on a random port in its own thread, then drives
//! the async engine and the blocking facade over real sockets. Checks that
//! request serialization, head parsing and every body framing work against
//! a real HTTP/1.1 implementation.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use h1_client::{AsyncHttpClient, ClientConfig, RequestInfo, ResponseHooks, ResponseInfo, SyncHttpClient};
use mock_server::Echo;
use tokio::sync::oneshot;

fn start_server() -> SocketAddr {
    let _ = env_logger::builder().is_test(true).try_init();

    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

async fn fetch_with(config: ClientConfig, request: RequestInfo, hooks: ResponseHooks) -> ResponseInfo {
    let client = AsyncHttpClient::new(config).unwrap();
    let (tx, rx) = oneshot::channel();
    client
        .make_request_with_hooks(request, hooks, move |response| {
            let _ = tx.send(response);
            Ok(())
        })
        .unwrap();
    let response = rx.await.unwrap();
    client.finished().await.unwrap();
    response
}

async fn fetch(request: RequestInfo) -> ResponseInfo {
    fetch_with(ClientConfig::default(), request, ResponseHooks::default()).await
}

fn echo_of(response: &ResponseInfo) -> Echo {
    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    serde_json::from_slice(&response.content).unwrap()
}

// --- content-length bodies ---

#[tokio::test(flavor = "multi_thread")]
async fn get_hello() {
    let addr = start_server();
    let response = fetch(RequestInfo::get(&format!("http://{addr}/hello"))).await;

    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    assert!(!response.timeout);
    assert_eq!(response.http_version, "HTTP/1.1");
    assert_eq!(response.status_code, 200);
    assert_eq!(response.status_msg, "OK");
    assert_eq!(response.header("Content-Length"), Some("12"));
    assert_eq!(response.content_str(), "hello, world");
}

#[tokio::test(flavor = "multi_thread")]
async fn path_is_encoded_and_queries_are_merged() {
    let addr = start_server();
    let request = RequestInfo::get(&format!("http://{addr}/a b?x=1")).with_query("y=2");
    let echo = echo_of(&fetch(request).await);

    assert_eq!(echo.method, "GET");
    assert_eq!(echo.path, "/a+b");
    assert_eq!(echo.query, "x=1&y=2");
    assert_eq!(echo.headers["host"], addr.to_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn post_sends_body_and_headers() {
    let addr = start_server();
    let request = RequestInfo::post(&format!("http://{addr}/submit"))
        .with_header("X-Custom", "yes")
        .with_body("payload");
    let echo = echo_of(&fetch(request).await);

    assert_eq!(echo.method, "POST");
    assert_eq!(echo.path, "/submit");
    assert_eq!(echo.body, "payload");
    assert_eq!(echo.headers["content-length"], "7");
    assert_eq!(echo.headers["x-custom"], "yes");
}

#[tokio::test(flavor = "multi_thread")]
async fn large_body_spans_many_reads() {
    let addr = start_server();
    let response = fetch(RequestInfo::get(&format!("http://{addr}/bytes/100000"))).await;

    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    assert_eq!(response.content.len(), 100_000);
    assert!(response
        .content
        .iter()
        .enumerate()
        .all(|(i, b)| *b == b'a' + (i % 26) as u8));
}

#[tokio::test(flavor = "multi_thread")]
async fn error_status_is_not_a_transport_error() {
    let addr = start_server();
    let response = fetch(RequestInfo::get(&format!("http://{addr}/status/500"))).await;

    assert!(response.is_ok());
    assert_eq!(response.status_code, 500);
    assert_eq!(response.content_str(), "status 500");
}

// --- other framings ---

#[tokio::test(flavor = "multi_thread")]
async fn chunked_body_is_decoded() {
    let addr = start_server();
    let response = fetch(RequestInfo::get(&format!("http://{addr}/chunked"))).await;

    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    assert_eq!(response.header("transfer-encoding"), Some("chunked"));
    assert_eq!(response.content_str(), "first second third");
}

#[tokio::test(flavor = "multi_thread")]
async fn no_content_response_has_empty_body() {
    let addr = start_server();
    let response = fetch(RequestInfo::delete(&format!("http://{addr}/empty"))).await;

    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    assert_eq!(response.status_code, 204);
    assert!(response.content.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn head_response_has_no_body() {
    let addr = start_server();
    let response = fetch(RequestInfo::head(&format!("http://{addr}/hello"))).await;

    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    assert_eq!(response.status_code, 200);
    assert!(response.content.is_empty());
}

// --- hooks ---

#[tokio::test(flavor = "multi_thread")]
async fn hooks_observe_head_and_stream_content() {
    let addr = start_server();
    let seen_status = Arc::new(Mutex::new(None));
    let streamed = Arc::new(Mutex::new(Vec::new()));

    let hooks = {
        let seen_status = Arc::clone(&seen_status);
        let streamed = Arc::clone(&streamed);
        ResponseHooks::new()
            .on_headers(move |response| {
                *seen_status.lock().unwrap() = Some(response.status_code);
                Ok(())
            })
            .on_content(move |data| {
                streamed.lock().unwrap().extend_from_slice(data);
                Ok(())
            })
    };
    let response = fetch_with(
        ClientConfig::default(),
        RequestInfo::get(&format!("http://{addr}/chunked")),
        hooks,
    )
    .await;

    assert!(response.is_ok(), "unexpected error: {}", response.error_msg);
    assert!(response.content.is_empty());
    assert_eq!(*seen_status.lock().unwrap(), Some(200));
    assert_eq!(&streamed.lock().unwrap()[..], b"first second third");
}

#[tokio::test(flavor = "multi_thread")]
async fn header_hook_can_reject_a_response() {
    let addr = start_server();
    let hooks = ResponseHooks::new().on_headers(|response| {
        if response.status_code == 200 {
            Err("not interested".to_string())
        } else {
            Ok(())
        }
    });
    let response = fetch_with(
        ClientConfig::default(),
        RequestInfo::get(&format!("http://{addr}/hello")),
        hooks,
    )
    .await;

    assert_eq!(response.error_msg, "response rejected by header hook: not interested");
    assert_eq!(response.status_code, 200);
    assert!(response.content.is_empty());
}

// --- deadline against a slow route ---

#[tokio::test(flavor = "multi_thread")]
async fn slow_route_times_out() {
    let addr = start_server();
    let response = fetch_with(
        ClientConfig::new(Duration::from_millis(100)),
        RequestInfo::get(&format!("http://{addr}/delay/2000")),
        ResponseHooks::default(),
    )
    .await;

    assert!(response.timeout);
    assert_eq!(response.error_msg, "timeout");
    assert_eq!(response.status_code, -1);
}

// --- blocking facade ---

#[test]
fn sync_client_runs_requests_back_to_back() {
    let addr = start_server();
    let client = SyncHttpClient::new(ClientConfig::default()).unwrap();

    let hello = client.make_request(RequestInfo::get(&format!("http://{addr}/hello")));
    assert!(hello.is_ok(), "unexpected error: {}", hello.error_msg);
    assert_eq!(hello.content_str(), "hello, world");

    let echo = client.make_request(RequestInfo::put(&format!("http://{addr}/item")).with_body("v2"));
    let echo = echo_of(&echo);
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.body, "v2");
}

#[test]
fn sync_client_reports_timeouts() {
    let addr = start_server();
    let client = SyncHttpClient::new(ClientConfig::new(Duration::from_millis(100))).unwrap();

    let response = client.make_request(RequestInfo::get(&format!("http://{addr}/delay/2000")));
    assert!(response.timeout);
    assert_eq!(response.error_msg, "timeout");
}

#[test]
fn sync_client_returns_transport_errors_as_responses() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = SyncHttpClient::new(ClientConfig::default()).unwrap();

    let response = client.make_request(RequestInfo::get(&format!("http://127.0.0.1:{port}/")));
    assert!(!response.timeout);
    assert_eq!(response.status_code, -1);
    assert!(response
        .error_msg
        .starts_with(&format!("cannot connect to address which has host=127.0.0.1 and service={port}")));
}
