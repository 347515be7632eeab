use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Why a symbol lookup failed recently.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureType {
    NotFound,       // Provider has no data for the symbol
    RateLimited,    // Temporary upstream throttling
}

#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub reason: String,
    pub error_type: FailureType,
    pub expires_at: DateTime<Utc>,
}

/// Remembers symbols the price provider recently failed on so repeated
/// analysis requests for a bad symbol do not hit the network every time.
#[derive(Clone)]
pub struct FailureCache {
    entries: Arc<DashMap<String, FailureInfo>>,
    not_found_ttl: Duration,
    rate_limited_ttl: Duration,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::with_ttls(Duration::hours(6), Duration::minutes(5))
    }

    pub fn with_ttls(not_found_ttl: Duration, rate_limited_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            not_found_ttl,
            rate_limited_ttl,
        }
    }

    /// Still-valid failure for `symbol`, if any. Expired entries are dropped.
    pub fn get(&self, symbol: &str) -> Option<FailureInfo> {
        let now = Utc::now();
        let info = self.entries.get(symbol).map(|entry| entry.value().clone())?;
        if now < info.expires_at {
            return Some(info);
        }
        self.entries.remove(symbol);
        None
    }

    pub fn record(&self, symbol: &str, error_type: FailureType, reason: impl Into<String>) {
        let ttl = match error_type {
            FailureType::NotFound => self.not_found_ttl,
            FailureType::RateLimited => self.rate_limited_ttl,
        };
        self.entries.insert(
            symbol.to_string(),
            FailureInfo {
                reason: reason.into(),
                error_type,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    pub fn clear(&self, symbol: &str) {
        self.entries.remove(symbol);
    }
}

impl Default for FailureCache {
    fn default() -> Self {
        Self::new()
    }
}
