//! Default freshness evaluator based on `Cache-Control`, `Expires` and `Date`.
//!
//! Evaluates from the point of view of a shared cache. Heuristic freshness
//! is not applied: a response without explicit lifetime is fresh until "now",
//! which the policy treats as stale.

use std::time::{Duration, SystemTime};

use axum::http::{header, HeaderMap, Method, StatusCode};

use crate::cache::policy::{Freshness, FreshnessEvaluator};
use crate::cache::RequestMeta;
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
struct Directives {
    public: bool,
    private: bool,
    no_cache: bool,
    no_store: bool,
    must_revalidate: bool,
    max_age: Option<Duration>,
    s_maxage: Option<Duration>,
}

/// Largest delta-seconds honoured; bigger values, including ones that do not
/// fit in a `u64`, are read as this (RFC 9111 section 1.2.2).
const MAX_DELTA_SECONDS: u64 = 1 << 31;

fn parse_seconds(name: &str, value: Option<&str>) -> Result<Duration> {
    let value = value.ok_or_else(|| {
        CacheError::PolicyIndeterminate(format!("{} directive without a value", name))
    })?;
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CacheError::PolicyIndeterminate(format!(
            "invalid {} value {:?}",
            name, value
        )));
    }
    let secs = value
        .parse::<u64>()
        .unwrap_or(MAX_DELTA_SECONDS)
        .min(MAX_DELTA_SECONDS);
    Ok(Duration::from_secs(secs))
}

fn parse_cache_control(headers: &HeaderMap) -> Result<Directives> {
    let mut cc = Directives::default();

    for value in headers.get_all(header::CACHE_CONTROL) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, arg) = match part.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (part, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "public" => cc.public = true,
                "private" => cc.private = true,
                "no-cache" => cc.no_cache = true,
                "no-store" => cc.no_store = true,
                "must-revalidate" => cc.must_revalidate = true,
                "max-age" => cc.max_age = Some(parse_seconds("max-age", arg)?),
                "s-maxage" => cc.s_maxage = Some(parse_seconds("s-maxage", arg)?),
                _ => {}
            }
        }
    }
    Ok(cc)
}

fn header_date(headers: &HeaderMap, name: header::HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| httpdate::parse_http_date(value).ok())
}

fn has_vary_star(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|name| name.trim() == "*")
}

// == Cache Control Evaluator ==
/// Freshness evaluator shipped with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheControlEvaluator;

impl CacheControlEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates against a given instant.
    pub fn evaluate_at(
        &self,
        request: &RequestMeta,
        headers: &HeaderMap,
        now: SystemTime,
    ) -> Result<Freshness> {
        let req_cc = parse_cache_control(&request.headers)?;
        let resp_cc = parse_cache_control(headers)?;
        let mut reasons = Vec::new();

        if request.method != Method::GET && request.method != Method::HEAD {
            reasons.push("request method is not cacheable".to_string());
        }
        if req_cc.no_store {
            reasons.push("request Cache-Control: no-store".to_string());
        }
        if request.headers.contains_key(header::AUTHORIZATION)
            && !(resp_cc.public || resp_cc.s_maxage.is_some() || resp_cc.must_revalidate)
        {
            reasons.push("request has Authorization header".to_string());
        }
        if resp_cc.no_store {
            reasons.push("response Cache-Control: no-store".to_string());
        }
        if resp_cc.private {
            reasons.push("response Cache-Control: private".to_string());
        }
        if resp_cc.no_cache {
            reasons.push("response Cache-Control: no-cache".to_string());
        }
        if has_vary_star(headers) {
            reasons.push("response Vary: *".to_string());
        }
        if !reasons.is_empty() {
            return Ok(Freshness::NotCacheable(reasons));
        }

        let date = header_date(headers, header::DATE).unwrap_or(now);
        let expires_at = if let Some(lifetime) = resp_cc.s_maxage.or(resp_cc.max_age) {
            date.checked_add(lifetime).ok_or_else(|| {
                CacheError::PolicyIndeterminate(
                    "freshness lifetime overflows the Date header".to_string(),
                )
            })?
        } else if headers.contains_key(header::EXPIRES) {
            // An unparseable Expires means already expired
            header_date(headers, header::EXPIRES).unwrap_or(date)
        } else {
            now
        };

        Ok(Freshness::FreshUntil(expires_at))
    }
}

impl FreshnessEvaluator for CacheControlEvaluator {
    fn evaluate(
        &self,
        request: &RequestMeta,
        _status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Freshness> {
        self.evaluate_at(request, headers, SystemTime::now())
    }
}
