//! Percent-encoding and `key=value&...` helpers.

use std::collections::BTreeMap;

use log::warn;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-encode `s`: unreserved characters pass through, space becomes
/// `+`, every other byte becomes `%XX` with upper-case hex digits.
pub fn url_encode(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(b as char)
            }
            b' ' => encoded.push('+'),
            _ => {
                encoded.push('%');
                encoded.push(HEX[(b >> 4) as usize] as char);
                encoded.push(HEX[(b & 0x0f) as usize] as char);
            }
        }
    }
    encoded
}

/// Inverse of [`url_encode`]. A `%` escape cut short by the end of input
/// stops decoding; invalid hex digits decode as zero.
pub fn url_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' => {
                if i + 2 >= bytes.len() {
                    break;
                }
                decoded.push(from_hex(bytes[i + 1]) << 4 | from_hex(bytes[i + 2]));
                i += 3;
            }
            b => {
                decoded.push(b);
                i += 1;
            }
        }
    }
    decoded
}

fn from_hex(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Percent-encode every `/`-delimited segment of `path` independently.
pub fn encode_path(path: &str) -> String {
    path.split('/').map(url_encode).collect::<Vec<_>>().join("/")
}

/// Join a map into `k1=v1&k2=v2` form using the given separators.
pub fn build_kv_string(params: &BTreeMap<String, String>, kv_sep: &str, pair_sep: &str) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}{kv_sep}{v}"))
        .collect::<Vec<_>>()
        .join(pair_sep)
}

/// Split `k1=v1&k2=v2` into a map. Empty pairs and pairs that do not split
/// into exactly one key and one value are skipped.
pub fn parse_kv_string(s: &str, kv_sep: &str, pair_sep: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for pair in s.split(pair_sep) {
        if pair.is_empty() {
            warn!("encountered an empty pair");
            continue;
        }
        let kv: Vec<&str> = pair.split(kv_sep).collect();
        if kv.len() != 2 {
            warn!("encountered a pair[{pair}] which can not split 2 parts by [{kv_sep}]");
            continue;
        }
        params.insert(kv[0].to_string(), kv[1].to_string());
    }
    params
}
