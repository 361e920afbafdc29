//! Single-shot HTTP/1.1 client on tokio.
//!
//! # Overview
//! [`AsyncHttpClient`] sends one request and reports the outcome through a
//! completion callback that runs exactly once. [`SyncHttpClient`] wraps it for
//! blocking callers. Request building and response parsing live in
//! `h1-core`; this crate owns sockets, timers and the completion contract.
//!
//! ```no_run
//! use h1_client::{AsyncHttpClient, ClientConfig, RequestInfo};
//!
//! # async fn demo() -> Result<(), h1_client::ClientError> {
//! let client = AsyncHttpClient::new(ClientConfig::default())?;
//! client.make_request(RequestInfo::get("http://127.0.0.1:3000/hello"), |response| {
//!     println!("{} {}", response.status_code, response.content_str());
//!     Ok(())
//! })?;
//! client.finished().await
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
mod exchange;
pub mod hooks;
pub mod sync;

pub use config::{CallbackPolicy, ClientConfig, ProxyInfo, DEFAULT_MAX_HEADER_BYTES, DEFAULT_TIMEOUT};
pub use engine::{AsyncHttpClient, CallbackResult, EngineState};
pub use error::{BoxError, ClientError, ConfigError, RequestError};
pub use hooks::{ContentHook, HeadersHook, ResponseHooks};
pub use sync::SyncHttpClient;

pub use h1_core::{HttpMethod, RequestInfo, ResponseInfo, UrlParts};
