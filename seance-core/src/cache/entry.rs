//! Cached values with independent freshness windows

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A cached value with its freshness window.
///
/// An entry younger than `stale_after` is served without refetch. Between
/// `stale_after` and `ttl` the value is still servable while a background
/// revalidation runs (stale-while-revalidate). Past `ttl` the entry is
/// evicted and must be refetched before use.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub stale_after: Duration,
    pub ttl: Duration,
}

impl<T> CachedEntry<T> {
    pub fn new(value: T, stale_after: Duration, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            stale_after,
            ttl,
        }
    }

    /// Age of the entry at `now`. Clock skew into the past counts as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Served without refetch.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.stale_after
    }

    /// Must be evicted and refetched before use.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) >= self.ttl
    }
}
