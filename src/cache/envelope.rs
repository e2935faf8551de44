//! Response Envelope Module
//!
//! The cached representation of a response and its byte codec.
//!
//! Layout: a big-endian `u32` length, a JSON head of that length carrying the
//! status and headers, then the raw body. Header values travel as base64 so
//! bytes outside visible ASCII replay exactly. The layout is private to this
//! module; nothing outside `encode`/`decode` depends on it.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

const HEAD_LEN_BYTES: usize = 4;

/// Ordered header multimap: names in first-seen order, raw values in arrival
/// order.
pub type HeaderList = Vec<(String, Vec<Vec<u8>>)>;

// == Response Envelope ==
/// Status, headers and body of a cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Head {
    status: u16,
    headers: Vec<HeadField>,
}

#[derive(Serialize, Deserialize)]
struct HeadField {
    name: String,
    values: Vec<String>,
}

impl ResponseEnvelope {
    pub fn new(status: u16, headers: HeaderList, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Captures a response, grouping repeated header names.
    pub fn from_parts(status: StatusCode, headers: &HeaderMap, body: Vec<u8>) -> Self {
        let mut list: HeaderList = Vec::with_capacity(headers.keys_len());
        for name in headers.keys() {
            let values = headers
                .get_all(name)
                .iter()
                .map(|value| value.as_bytes().to_vec())
                .collect();
            list.push((name.as_str().to_string(), values));
        }
        Self::new(status.as_u16(), list, body)
    }

    /// Rebuilds an HTTP response from the envelope.
    ///
    /// Fails rather than serving a partial response when the status or a
    /// header is not valid HTTP.
    pub fn to_response(&self) -> Result<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| CacheError::Decoding(format!("invalid status {}", self.status)))?;

        let mut headers = HeaderMap::new();
        for (name, values) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CacheError::Decoding(format!("invalid header name {:?}", name)))?;
            for value in values {
                let value = HeaderValue::from_bytes(value).map_err(|_| {
                    CacheError::Decoding(format!("invalid value for header {}", name))
                })?;
                headers.append(name.clone(), value);
            }
        }

        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

// == Encode ==
/// Serializes an envelope into bytes for the store.
pub fn encode(envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
    let head = Head {
        status: envelope.status,
        headers: envelope
            .headers
            .iter()
            .map(|(name, values)| HeadField {
                name: name.clone(),
                values: values.iter().map(|value| STANDARD.encode(value)).collect(),
            })
            .collect(),
    };
    let head = serde_json::to_vec(&head)
        .map_err(|e| CacheError::Decoding(format!("failed to encode envelope head: {}", e)))?;

    let head_len = u32::try_from(head.len())
        .map_err(|_| CacheError::Decoding("envelope head too large".to_string()))?;

    let mut out = Vec::with_capacity(HEAD_LEN_BYTES + head.len() + envelope.body.len());
    out.extend_from_slice(&head_len.to_be_bytes());
    out.extend_from_slice(&head);
    out.extend_from_slice(&envelope.body);
    Ok(out)
}

// == Decode ==
/// Parses bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<ResponseEnvelope> {
    if bytes.len() < HEAD_LEN_BYTES {
        return Err(CacheError::Decoding(format!(
            "envelope truncated: {} bytes",
            bytes.len()
        )));
    }
    let (len_bytes, rest) = bytes.split_at(HEAD_LEN_BYTES);
    let mut len_buf = [0u8; HEAD_LEN_BYTES];
    len_buf.copy_from_slice(len_bytes);
    let head_len = u32::from_be_bytes(len_buf) as usize;

    if head_len > rest.len() {
        return Err(CacheError::Decoding(format!(
            "envelope head length {} exceeds {} available bytes",
            head_len,
            rest.len()
        )));
    }
    let (head_bytes, body) = rest.split_at(head_len);

    let head: Head = serde_json::from_slice(head_bytes)
        .map_err(|e| CacheError::Decoding(format!("invalid envelope head: {}", e)))?;

    let mut headers: HeaderList = Vec::with_capacity(head.headers.len());
    for field in head.headers {
        let values = field
            .values
            .iter()
            .map(|value| {
                STANDARD.decode(value).map_err(|e| {
                    CacheError::Decoding(format!("invalid value for header {}: {}", field.name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        headers.push((field.name, values));
    }

    Ok(ResponseEnvelope::new(head.status, headers, body.to_vec()))
}
