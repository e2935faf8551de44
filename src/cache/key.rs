//! Cache Key Module
//!
//! Derives a canonical, order-independent key from method, host, path and
//! query parameters.

use std::collections::BTreeMap;

use url::form_urlencoded;

// == Build Key ==
/// Builds the canonical cache key for a request.
///
/// The key is `method + host + path`, followed by `?` and the query
/// parameters when there are any. Parameter names are sorted, and so are the
/// values of each name, so neither parameter order nor repeated-value order
/// affects the key. Names and values are query-escaped, which keeps `=` and
/// `&` inside a value from being confused with separators.
pub fn build_key(method: &str, host: &str, path: &str, query: &[(String, String)]) -> String {
    let mut key = String::with_capacity(method.len() + host.len() + path.len());
    key.push_str(method);
    key.push_str(host);
    key.push_str(path);

    if query.is_empty() {
        return key;
    }

    let mut params: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in query {
        params.entry(name.as_str()).or_default().push(value.as_str());
    }

    let mut parts = Vec::with_capacity(query.len());
    for (name, mut values) in params {
        values.sort_unstable();
        for value in values {
            parts.push(format!("{}={}", escape(name), escape(value)));
        }
    }

    key.push('?');
    key.push_str(&parts.join("&"));
    key
}

// == Parse Query ==
/// Decodes a raw query string into (name, value) pairs.
///
/// Percent escapes and `+` are decoded; a bare name yields an empty value.
pub fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    match raw {
        Some(raw) => form_urlencoded::parse(raw.as_bytes())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect(),
        None => Vec::new(),
    }
}

fn escape(component: &str) -> String {
    form_urlencoded::byte_serialize(component.as_bytes()).collect()
}
