//! Request metadata used for keying and cacheability decisions.

use axum::http::{header, request::Parts, HeaderMap, Method};

use crate::cache::key::{build_key, parse_query};

/// The parts of a request the cache looks at.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    /// Host as sent by the client, including any port
    pub host: String,
    pub path: String,
    /// Decoded query parameters in arrival order
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RequestMeta {
    /// Captures request metadata. The `Host` header wins over the URI
    /// authority, which HTTP/2 requests carry instead.
    pub fn from_parts(parts: &Parts) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            host,
            path: parts.uri.path().to_string(),
            query: parse_query(parts.uri.query()),
            headers: parts.headers.clone(),
        }
    }

    pub fn cache_key(&self) -> String {
        build_key(self.method.as_str(), &self.host, &self.path, &self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn meta(uri: &str, host: Option<&str>) -> RequestMeta {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        RequestMeta::from_parts(&parts)
    }

    #[test]
    fn test_key_ignores_query_order() {
        let a = meta("/foo?b=2&a=1", Some("example.com"));
        let b = meta("/foo?a=1&b=2", Some("example.com"));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "GETexample.com/foo?a=1&b=2");
    }

    #[test]
    fn test_host_header_preferred() {
        let m = meta("http://authority.test:8080/x", Some("header.test"));
        assert_eq!(m.host, "header.test");
    }

    #[test]
    fn test_host_falls_back_to_authority() {
        let m = meta("http://authority.test:8080/x", None);
        assert_eq!(m.host, "authority.test:8080");
        assert_eq!(m.path, "/x");
    }
}
