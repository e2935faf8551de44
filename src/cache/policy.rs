//! Cacheability Policy Module
//!
//! Decides whether a response enters the store and for how long: a status
//! gate, then the freshness evaluator, then the configured TTL ceiling.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::cache::RequestMeta;
use crate::error::Result;

// == Freshness Evaluator ==
/// Verdict of a freshness evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Not storable, with one reason per violated rule
    NotCacheable(Vec<String>),
    /// Storable and fresh until the given instant
    FreshUntil(SystemTime),
}

/// Computes HTTP freshness for an already-received response.
///
/// Implementations must be pure computation over the given metadata; the
/// policy calls them on the request path. An `Err` means no verdict could be
/// reached and the response is not cached.
pub trait FreshnessEvaluator: Send + Sync {
    fn evaluate(
        &self,
        request: &RequestMeta,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Freshness>;
}

impl<F> FreshnessEvaluator for F
where
    F: Fn(&RequestMeta, StatusCode, &HeaderMap) -> Result<Freshness> + Send + Sync,
{
    fn evaluate(
        &self,
        request: &RequestMeta,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Freshness> {
        self(request, status, headers)
    }
}

// == Decision ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Status outside 200..400
    Status(u16),
    /// The evaluator listed reasons
    NotCacheable(Vec<String>),
    /// The evaluator failed
    Indeterminate(String),
    /// Expiry is not in the future
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    Store { ttl: Duration },
    Skip(SkipReason),
}

impl CacheDecision {
    /// TTL to store with, `None` when the response is not cacheable.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CacheDecision::Store { ttl } => Some(*ttl),
            CacheDecision::Skip(_) => None,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, CacheDecision::Store { .. })
    }
}

// == Cacheability Policy ==
#[derive(Clone)]
pub struct CacheabilityPolicy {
    evaluator: Arc<dyn FreshnessEvaluator>,
    max_expiry: Duration,
}

impl CacheabilityPolicy {
    pub fn new(evaluator: Arc<dyn FreshnessEvaluator>, max_expiry: Duration) -> Self {
        Self {
            evaluator,
            max_expiry,
        }
    }

    pub fn max_expiry(&self) -> Duration {
        self.max_expiry
    }

    /// Decides against the current time.
    pub fn decide(
        &self,
        request: &RequestMeta,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> CacheDecision {
        self.decide_at(request, status, headers, SystemTime::now())
    }

    /// Decides against a given instant.
    ///
    /// Any evaluator error fails closed.
    pub fn decide_at(
        &self,
        request: &RequestMeta,
        status: StatusCode,
        headers: &HeaderMap,
        now: SystemTime,
    ) -> CacheDecision {
        let code = status.as_u16();
        if !(200..400).contains(&code) {
            return CacheDecision::Skip(SkipReason::Status(code));
        }

        let expires_at = match self.evaluator.evaluate(request, status, headers) {
            Ok(Freshness::FreshUntil(instant)) => instant,
            Ok(Freshness::NotCacheable(reasons)) => {
                debug!(path = %request.path, ?reasons, "Response not cacheable");
                return CacheDecision::Skip(SkipReason::NotCacheable(reasons));
            }
            Err(err) => {
                warn!(path = %request.path, error = %err, "Error determining cacheability");
                return CacheDecision::Skip(SkipReason::Indeterminate(err.to_string()));
            }
        };

        let ttl = match expires_at.duration_since(now) {
            Ok(ttl) if !ttl.is_zero() => ttl,
            _ => return CacheDecision::Skip(SkipReason::Stale),
        };

        CacheDecision::Store {
            ttl: ttl.min(self.max_expiry),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use axum::http::Request;

    fn request() -> RequestMeta {
        let (parts, _) = Request::builder()
            .uri("/foo")
            .header("host", "example.com")
            .body(())
            .unwrap()
            .into_parts();
        RequestMeta::from_parts(&parts)
    }

    fn fixed(verdict: Result<Freshness>) -> Arc<dyn FreshnessEvaluator> {
        let verdict = match verdict {
            Ok(v) => Ok(v),
            Err(e) => Err(e.to_string()),
        };
        Arc::new(move |_: &RequestMeta, _: StatusCode, _: &HeaderMap| match &verdict {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(CacheError::PolicyIndeterminate(e.clone())),
        })
    }

    fn fresh_for(now: SystemTime, secs: u64) -> Arc<dyn FreshnessEvaluator> {
        fixed(Ok(Freshness::FreshUntil(now + Duration::from_secs(secs))))
    }

    #[test]
    fn test_ttl_below_ceiling_is_kept() {
        let now = SystemTime::now();
        let policy = CacheabilityPolicy::new(fresh_for(now, 30), Duration::from_secs(60));

        let decision = policy.decide_at(&request(), StatusCode::OK, &HeaderMap::new(), now);
        assert_eq!(decision.ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_ttl_above_ceiling_is_clamped() {
        let now = SystemTime::now();
        let policy = CacheabilityPolicy::new(fresh_for(now, 3600), Duration::from_secs(60));

        let decision = policy.decide_at(&request(), StatusCode::OK, &HeaderMap::new(), now);
        assert_eq!(decision.ttl(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_error_statuses_never_cached() {
        let now = SystemTime::now();
        let policy = CacheabilityPolicy::new(fresh_for(now, 30), Duration::from_secs(60));

        for status in [StatusCode::CONTINUE, StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR] {
            let decision = policy.decide_at(&request(), status, &HeaderMap::new(), now);
            assert_eq!(
                decision,
                CacheDecision::Skip(SkipReason::Status(status.as_u16()))
            );
        }
    }

    #[test]
    fn test_redirects_are_eligible() {
        let now = SystemTime::now();
        let policy = CacheabilityPolicy::new(fresh_for(now, 30), Duration::from_secs(60));

        let decision =
            policy.decide_at(&request(), StatusCode::MOVED_PERMANENTLY, &HeaderMap::new(), now);
        assert!(decision.is_cacheable());
    }

    #[test]
    fn test_evaluator_reasons_skip() {
        let reasons = vec!["response Cache-Control: no-store".to_string()];
        let policy = CacheabilityPolicy::new(
            fixed(Ok(Freshness::NotCacheable(reasons.clone()))),
            Duration::from_secs(60),
        );

        let decision = policy.decide(&request(), StatusCode::OK, &HeaderMap::new());
        assert_eq!(decision, CacheDecision::Skip(SkipReason::NotCacheable(reasons)));
    }

    #[test]
    fn test_evaluator_error_fails_closed() {
        let policy = CacheabilityPolicy::new(
            fixed(Err(CacheError::PolicyIndeterminate("bad max-age".to_string()))),
            Duration::from_secs(60),
        );

        let decision = policy.decide(&request(), StatusCode::OK, &HeaderMap::new());
        assert!(matches!(
            decision,
            CacheDecision::Skip(SkipReason::Indeterminate(_))
        ));
    }

    #[test]
    fn test_zero_or_past_expiry_is_stale() {
        let now = SystemTime::now();
        for expiry in [now, now - Duration::from_secs(10)] {
            let policy = CacheabilityPolicy::new(
                fixed(Ok(Freshness::FreshUntil(expiry))),
                Duration::from_secs(60),
            );
            let decision = policy.decide_at(&request(), StatusCode::OK, &HeaderMap::new(), now);
            assert_eq!(decision, CacheDecision::Skip(SkipReason::Stale));
        }
    }
}
