//! Test server for the HTTP/1.1 client engine.
//!
//! `app()` is a well-behaved axum server covering the body framings hyper
//! produces on its own (content-length, chunked, no-content, HEAD). The
//! `raw` module scripts a bare TCP peer for everything a compliant server
//! would never do: close-delimited bodies, truncated bodies, stalls.

pub mod raw;

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Largest body `/bytes/{n}` will produce.
const MAX_BYTES: usize = 8 * 1024 * 1024;

/// What the server saw, returned by the fallback route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/chunked", get(chunked))
        .route("/empty", get(empty).delete(empty))
        .route("/bytes/{n}", get(bytes))
        .route("/delay/{ms}", get(delay))
        .route("/status/{code}", get(status))
        .fallback(echo)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn hello() -> &'static str {
    "hello, world"
}

/// Streams three fragments with no length, so hyper frames them as chunks.
async fn chunked() -> Response {
    let parts = ["first ", "second ", "third"];
    let stream = futures::stream::iter(parts.into_iter().map(|p| Ok::<_, Infallible>(Bytes::from(p))));
    ([(header::CONTENT_TYPE, "text/plain")], Body::from_stream(stream)).into_response()
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn bytes(Path(n): Path<usize>) -> Result<Vec<u8>, StatusCode> {
    if n > MAX_BYTES {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    Ok((0..n).map(|i| b'a' + (i % 26) as u8).collect())
}

async fn delay(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or("").to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
