//! I/O-free HTTP/1.1 protocol layer.
//!
//! # Overview
//! Builds request bytes and parses response bytes without touching the
//! network (host-does-IO pattern). The `h1-client` crate owns the socket
//! and feeds received bytes through these functions.
//!
//! # Design
//! - `UrlParts` decomposes a URL; it never fails.
//! - `RequestInfo` + `build_request` produce the exact request bytes,
//!   injecting `Host` and `Content-Length` when the caller did not.
//! - `parse_response_head` and `body_framing` turn a raw head into a
//!   `ResponseHead` and pick one of the four RFC 2616 body framings.
//! - `decode_chunked` / `ChunkedDecoder` decode chunked bodies from partial
//!   input.

pub mod chunked;
pub mod encode;
pub mod error;
pub mod request;
pub mod response;
pub mod url;

pub use chunked::{decode_chunked, ChunkedBody, ChunkedDecoder};
pub use encode::{build_kv_string, encode_path, parse_kv_string, url_decode, url_encode};
pub use error::HeadError;
pub use request::{build_request, HttpMethod, RequestInfo, TargetForm};
pub use response::{body_framing, find_head_end, parse_response_head, BodyFraming, ResponseHead, ResponseInfo};
pub use url::{service_port, UrlParts};
