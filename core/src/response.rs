//! Response description, head parsing and body-framing decision.

use std::borrow::Cow;
use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::HeadError;
use crate::request::HttpMethod;

/// Outcome of one request as seen by the completion callback.
///
/// Check `timeout` first, then `error_msg`: an empty message means the
/// exchange finished without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub timeout: bool,
    pub error_msg: String,
    pub http_version: String,
    /// `-1` until a status line has been parsed.
    pub status_code: i32,
    pub status_msg: String,
    /// Header map with lower-cased keys.
    pub headers: HashMap<String, String>,
    pub content: Vec<u8>,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            timeout: false,
            error_msg: String::new(),
            http_version: String::new(),
            status_code: -1,
            status_msg: String::new(),
            headers: HashMap::new(),
            content: Vec::new(),
        }
    }
}

impl ResponseInfo {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// No timeout and no error.
    pub fn is_ok(&self) -> bool {
        !self.timeout && self.error_msg.is_empty()
    }

    pub fn content_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Copy a parsed head into this response.
    pub fn apply_head(&mut self, head: ResponseHead) {
        self.http_version = head.http_version;
        self.status_code = head.status_code;
        self.status_msg = head.status_msg;
        self.headers = head.headers;
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub http_version: String,
    pub status_code: i32,
    pub status_msg: String,
    pub headers: HashMap<String, String>,
}

/// Offset just past the `\r\n\r\n` that ends the head, if present.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Parse a status line followed by header lines.
///
/// Header lines without a colon or with an empty key are skipped. Duplicate
/// keys keep the last value.
pub fn parse_response_head(raw: &str) -> Result<ResponseHead, HeadError> {
    let mut lines = raw.lines();
    let status_line = lines.next().unwrap_or("");

    let mut tokens = status_line.trim_start().splitn(2, char::is_whitespace);
    let http_version = tokens.next().filter(|v| !v.is_empty()).ok_or(HeadError::MissingStatusLine)?;
    let rest = tokens.next().unwrap_or("").trim_start();
    // The code is the leading run of digits; whatever follows is the reason.
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let (code, reason) = rest.split_at(digits);
    let status_code = code.parse::<i32>().map_err(|_| {
        let token = rest.split(char::is_whitespace).next().unwrap_or("");
        HeadError::InvalidStatusCode(token.to_string())
    })?;
    let status_msg = reason.trim().to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            warn!("skipping header line without colon: {line}");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            warn!("encountered an empty key");
            continue;
        }
        headers.insert(key.to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(ResponseHead {
        http_version: http_version.to_string(),
        status_code,
        status_msg,
        headers,
    })
}

/// How the end of a response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "length", rename_all = "snake_case")]
pub enum BodyFraming {
    /// The response carries no body.
    None,
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Exactly this many bytes.
    ContentLength(usize),
    /// Everything until the peer closes the connection.
    CloseDelimited,
}

/// Pick the body framing for a response, in RFC 2616 §4.4 priority order.
pub fn body_framing(status_code: i32, method: HttpMethod, headers: &HashMap<String, String>) -> BodyFraming {
    if status_code / 100 == 1 || status_code == 204 || status_code == 304 || method == HttpMethod::Head {
        return BodyFraming::None;
    }

    let transfer_encoding = headers.get("transfer-encoding");
    if let Some(te) = transfer_encoding {
        if te.to_ascii_lowercase().contains("chunked") {
            return BodyFraming::Chunked;
        }
    }

    if transfer_encoding.is_none() {
        if let Some(length) = headers.get("content-length") {
            match length.trim().parse::<usize>() {
                Ok(length) => return BodyFraming::ContentLength(length),
                Err(_) => warn!("invalid content-length [{length}], reading until close"),
            }
        }
    }

    BodyFraming::CloseDelimited
}
