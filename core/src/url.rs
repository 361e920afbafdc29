//! URL decomposition.
//!
//! # Design
//! `UrlParts::parse` never fails. Malformed input degrades to best-effort
//! fields: a missing scheme leaves `scheme` empty, a missing path becomes
//! `/`, and a port that is not a number becomes `0`. The engine decides what
//! to do with those values (a zero port falls back to the scheme's service).

use log::{debug, error};

/// The pieces of a request URL the builder and the resolver need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    /// Lower-cased scheme, e.g. `http`. Empty when the URL has no `://`.
    pub scheme: String,
    /// Host token exactly as written, including `:port` when present.
    pub host_all: String,
    /// Host without the port, used for name resolution.
    pub host: String,
    /// Explicit port, `0` when absent or unparsable.
    pub port: u16,
    /// Path component, defaults to `/`.
    pub path: String,
    /// Everything after the first `?`, without the `?`.
    pub query: String,
}

impl UrlParts {
    pub fn parse(url: &str) -> Self {
        let mut parts = UrlParts::default();

        let rest = match url.find("://") {
            Some(pos) => {
                parts.scheme = url[..pos].to_ascii_lowercase();
                &url[pos + 3..]
            }
            None => url,
        };

        let (host_all, path_and_query) = match rest.find(|c: char| c == '/' || c == '?') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        parts.host_all = host_all.to_string();

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };
        parts.path = if path.is_empty() { "/".to_string() } else { path.to_string() };
        parts.query = query.to_string();

        match host_all.split_once(':') {
            Some((host, port)) => {
                parts.host = host.to_string();
                parts.port = port.parse().unwrap_or(0);
                if parts.port == 0 {
                    error!("port str[{port}] can not be converted to number, set port number 0");
                }
            }
            None => parts.host = host_all.to_string(),
        }

        debug!(
            "url[{url}] parse result: host_all={}, path={}, host={}, query={}, port={}, scheme={}",
            parts.host_all, parts.path, parts.host, parts.query, parts.port, parts.scheme
        );
        parts
    }

    /// Service name handed to the resolver: the explicit port when there is
    /// one, otherwise the scheme, otherwise `http`.
    pub fn service(&self) -> String {
        if self.port != 0 {
            self.port.to_string()
        } else if !self.scheme.is_empty() {
            self.scheme.clone()
        } else {
            "http".to_string()
        }
    }
}

/// Map a service name (numeric port or well-known scheme) to a port number.
pub fn service_port(service: &str) -> Option<u16> {
    if let Ok(port) = service.parse::<u16>() {
        return Some(port);
    }
    match service.to_ascii_lowercase().as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_is_split_into_all_parts() {
        let parts = UrlParts::parse("HTTP://example.com:8080/a/b?x=1&y=2");
        assert_eq!(parts.scheme, "http");
        assert_eq!(parts.host_all, "example.com:8080");
        assert_eq!(parts.host, "example.com");
        assert_eq!(parts.port, 8080);
        assert_eq!(parts.path, "/a/b");
        assert_eq!(parts.query, "x=1&y=2");
    }

    #[test]
    fn missing_path_defaults_to_root() {
        let parts = UrlParts::parse("http://example.com");
        assert_eq!(parts.path, "/");
        assert!(parts.query.is_empty());
    }

    #[test]
    fn query_directly_after_host() {
        let parts = UrlParts::parse("http://example.com?x=1");
        assert_eq!(parts.host_all, "example.com");
        assert_eq!(parts.path, "/");
        assert_eq!(parts.query, "x=1");
    }

    #[test]
    fn url_without_scheme() {
        let parts = UrlParts::parse("example.com/index.html");
        assert!(parts.scheme.is_empty());
        assert_eq!(parts.host, "example.com");
        assert_eq!(parts.path, "/index.html");
        assert_eq!(parts.service(), "http");
    }

    #[test]
    fn non_numeric_port_becomes_zero() {
        let parts = UrlParts::parse("http://example.com:abc/");
        assert_eq!(parts.host, "example.com");
        assert_eq!(parts.host_all, "example.com:abc");
        assert_eq!(parts.port, 0);
        assert_eq!(parts.service(), "http");
    }

    #[test]
    fn service_prefers_port_then_scheme() {
        assert_eq!(UrlParts::parse("http://h:81/").service(), "81");
        assert_eq!(UrlParts::parse("https://h/").service(), "https");
    }

    #[test]
    fn service_port_maps_known_names() {
        assert_eq!(service_port("8080"), Some(8080));
        assert_eq!(service_port("http"), Some(80));
        assert_eq!(service_port("HTTPS"), Some(443));
        assert_eq!(service_port("gopher"), None);
    }

    #[test]
    fn space_in_path_is_kept_raw() {
        let parts = UrlParts::parse("http://example.com/a b?x=1");
        assert_eq!(parts.path, "/a b");
        assert_eq!(parts.query, "x=1");
    }
}
