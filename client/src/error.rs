//! Error types for the client engine.
//!
//! # Design
//! `RequestError` covers every way a started request can end badly. Its
//! `Display` text is what the callback sees in `ResponseInfo::error_msg`, so
//! the transport variants carry host/service context and the header-parse
//! variant carries the raw head. `ClientError` is for misuse of the API and
//! for infrastructure failures that never reach a callback.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Boxed error returned by a completion callback.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Terminal failure of a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("cannot resolve address which has host={host} and service={service}, error: {source}")]
    Resolve {
        host: String,
        service: String,
        source: io::Error,
    },

    #[error("cannot connect to address which has host={host} and service={service}, error: {source}")]
    Connect {
        host: String,
        service: String,
        source: io::Error,
    },

    #[error("cannot send data to address which has host={host} and service={service}, error: {source}")]
    Send {
        host: String,
        service: String,
        source: io::Error,
    },

    #[error("cannot receive response header, error: {0}")]
    RecvHeader(io::Error),

    #[error("cannot parse header, invalid header:\r\n{raw}")]
    ParseHeader { raw: String },

    /// Transport error while reading the body; shown as the bare error text.
    #[error("{0}")]
    Body(io::Error),

    #[error("response rejected by header hook: {0}")]
    HeadersRejected(String),

    #[error("response rejected by content hook: {0}")]
    ContentRejected(String),

    #[error("timeout")]
    Timeout,

    #[error("abandoned")]
    Abandoned,
}

/// Errors returned by the client API itself.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,

    #[error("a request has already been made on this client")]
    AlreadyStarted,

    #[error("response callback failed: {0}")]
    Callback(BoxError),

    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Bad values in `H1_*` environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("timeout [{0}] is not a number of seconds")]
    InvalidTimeout(String),

    #[error("callback policy [{0}] is not one of suppress, propagate")]
    InvalidPolicy(String),

    #[error("proxy [{0}] is not host:port")]
    InvalidProxy(String),

    #[error("max header bytes [{0}] is not a number")]
    InvalidMaxHeaderBytes(String),
}
