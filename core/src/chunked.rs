//! Chunked transfer-encoding decoder.
//!
//! # Design
//! `decode_chunked` is restartable: it decodes every chunk fully present in
//! its input and reports how many input bytes those chunks covered.
//! `ChunkedDecoder` keeps only the unconsumed tail between calls, so its
//! buffer never holds more than one partial chunk.

use log::warn;

/// Result of scanning a (possibly partial) chunked body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedBody {
    /// The terminating zero-size chunk has been seen.
    pub complete: bool,
    /// Concatenated data of every chunk fully present in the input.
    pub content: Vec<u8>,
    /// Input bytes covered by `content`; decoding can resume from here.
    pub consumed: usize,
}

/// Decode as much of `raw` as is available.
///
/// A chunk's data is only included once all of its declared bytes are
/// present. Chunk extensions and trailers are ignored. A size line without
/// hex digits is treated as size zero.
pub fn decode_chunked(raw: &[u8]) -> ChunkedBody {
    let mut body = ChunkedBody::default();
    let mut pos = 0;

    while let Some(line_len) = find_crlf(&raw[pos..]) {
        let size_line = String::from_utf8_lossy(&raw[pos..pos + line_len]);
        let size_token = size_line.trim();
        let data_start = pos + line_len + 2;
        if size_token.is_empty() {
            pos = data_start;
            body.consumed = pos;
            continue;
        }

        let size = parse_chunk_size(size_token);
        if size == 0 {
            body.complete = true;
            break;
        }

        let Some(data_end) = data_start.checked_add(size).filter(|end| *end <= raw.len()) else {
            break;
        };
        body.content.extend_from_slice(&raw[data_start..data_end]);
        pos = data_end;
        body.consumed = pos;
        // Skip the CRLF that closes the chunk data, if it has arrived. A
        // resumed scan treats a leftover CRLF as an empty line.
        if raw[pos..].starts_with(b"\r\n") {
            pos += 2;
            body.consumed = pos;
        } else if pos + 2 > raw.len() {
            break;
        }
    }

    body
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(token: &str) -> usize {
    let digits_len = token
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(token.len());
    let digits = &token[..digits_len];
    if digits.is_empty() {
        warn!("invalid chunk size [{token}], treating as 0");
        return 0;
    }
    match usize::from_str_radix(digits, 16) {
        Ok(size) => size,
        Err(_) => {
            warn!("chunk size [{token}] overflows, treating as 0");
            0
        }
    }
}

/// Incremental front-end over [`decode_chunked`].
#[derive(Debug, Default)]
pub struct ChunkedDecoder {
    pending: Vec<u8>,
    complete: bool,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes and return the data of every chunk they
    /// completed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        if self.complete {
            return Vec::new();
        }
        self.pending.extend_from_slice(data);
        let body = decode_chunked(&self.pending);
        self.complete = body.complete;
        self.pending.drain(..body.consumed);
        body.content
    }

    /// Raw bytes held back until the chunk they belong to is complete.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// The terminating zero-size chunk has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}
