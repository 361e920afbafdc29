//! Request description and wire serialization.
//!
//! # Design
//! `RequestInfo` is plain data plus a few builder helpers. It never touches
//! the network: `build_request` turns it into the exact bytes the engine
//! writes to the socket. Headers live in a `BTreeMap` so the emitted order is
//! deterministic (sorted by key, as supplied).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encode::encode_path;
use crate::url::UrlParts;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the request target appears in the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    /// `path[?query]`, for requests sent straight to the origin server.
    Origin,
    /// `scheme://host[:port]path[?query]`, for requests sent through a proxy.
    Absolute,
}

/// A single HTTP/1.1 request described as plain data.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: HttpMethod,
    pub http_version: String,
    pub url: UrlParts,
    /// Extra query string merged after the URL's own query.
    pub query: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Percent-encode each path segment when serializing. On by default.
    pub encode_path: bool,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            http_version: "HTTP/1.1".to_string(),
            url: UrlParts::parse(""),
            query: String::new(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            encode_path: true,
        }
    }
}

impl RequestInfo {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: UrlParts::parse(url),
            ..Self::default()
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: &str) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: &str) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: &str) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn head(url: &str) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = UrlParts::parse(url);
    }

    /// Insert or replace a header. Keys keep the caller's casing.
    pub fn add_header(&mut self, key: &str, value: &str) {
        self.headers.insert(key.to_string(), value.to_string());
    }

    /// Append bytes to the body.
    pub fn add_body(&mut self, data: impl AsRef<[u8]>) {
        self.body.extend_from_slice(data.as_ref());
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.add_header(key, value);
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn with_body(mut self, data: impl AsRef<[u8]>) -> Self {
        self.add_body(data);
        self
    }

    pub fn with_http_version(mut self, version: &str) -> Self {
        self.http_version = version.to_string();
        self
    }

    pub fn with_path_encoding(mut self, enabled: bool) -> Self {
        self.encode_path = enabled;
        self
    }

    /// Case-insensitive header presence check.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// The URL's own query joined with the extra query.
    pub fn merged_query(&self) -> String {
        if !self.url.query.is_empty() && !self.query.is_empty() {
            format!("{}&{}", self.url.query, self.query)
        } else {
            format!("{}{}", self.url.query, self.query)
        }
    }

    /// Request target for the request line.
    pub fn target(&self, form: TargetForm) -> String {
        let mut target = String::new();
        if form == TargetForm::Absolute {
            if !self.url.scheme.is_empty() {
                target.push_str(&self.url.scheme);
                target.push_str("://");
            }
            target.push_str(&self.url.host_all);
        }
        if self.encode_path {
            target.push_str(&encode_path(&self.url.path));
        } else {
            target.push_str(&self.url.path);
        }
        let query = self.merged_query();
        if !query.is_empty() {
            target.push('?');
            target.push_str(&query);
        }
        target
    }
}

/// Serialize `request` into the bytes written to the socket.
pub fn build_request(request: &RequestInfo, form: TargetForm) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    head.push_str(request.method.as_str());
    head.push(' ');
    head.push_str(&request.target(form));
    head.push(' ');
    head.push_str(&request.http_version);
    head.push_str("\r\n");

    for (key, value) in &request.headers {
        head.push_str(key);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    if !request.has_header("Host") {
        head.push_str("Host: ");
        head.push_str(&request.url.host_all);
        head.push_str("\r\n");
    }
    if !request.has_header("Content-Length") && !request.body.is_empty() {
        head.push_str(&format!("Content-Length: {}\r\n", request.body.len()));
    }
    head.push_str("\r\n");

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(&request.body);
    bytes
}
