//! Hierarchical cache keys
//!
//! A key is an ordered list of segments rooted at a [`CacheDomain`].
//! Invalidating a coarser key invalidates everything nested under it, which
//! is what makes the coordinator's invalidation ordering testable without a
//! UI in the loop.

use crate::types::{CacheDomain, ViewLevel};

/// Composite, order-preserving cache key.
///
/// Two keys are equal iff every segment is equal; construction is
/// deterministic, so the same inputs always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    segments: Vec<String>,
}

impl CacheKey {
    /// Key for a session's stored view preference.
    pub fn preference(session_id: &str) -> Self {
        Self::domain_prefix(CacheDomain::Preference, session_id)
    }

    /// Key for a session's message list at a view level.
    pub fn messages(session_id: &str, level: ViewLevel) -> Self {
        let mut key = Self::domain_prefix(CacheDomain::Messages, session_id);
        key.segments.push(level.as_str().to_string());
        key
    }

    /// Key for a session's QA pairs at a view level.
    pub fn qa_pairs(session_id: &str, level: ViewLevel) -> Self {
        let mut key = Self::domain_prefix(CacheDomain::QaPairs, session_id);
        key.segments.push(level.as_str().to_string());
        key
    }

    /// Key for an export artifact, with caller-defined trailing segments.
    pub fn export(session_id: &str, extra: &[&str]) -> Self {
        let mut key = Self::domain_prefix(CacheDomain::Export, session_id);
        key.segments.extend(extra.iter().map(|s| s.to_string()));
        key
    }

    /// Coarse prefix covering every key of a domain under one session.
    pub fn domain_prefix(domain: CacheDomain, session_id: &str) -> Self {
        Self {
            segments: vec![domain.as_str().to_string(), session_id.to_string()],
        }
    }

    /// Whether this key is `prefix` itself or nested under it.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// The domain this key is rooted at, if the root segment names one.
    pub fn domain(&self) -> Option<CacheDomain> {
        match self.segments.first().map(String::as_str) {
            Some("preference") => Some(CacheDomain::Preference),
            Some("messages") => Some(CacheDomain::Messages),
            Some("qa_pairs") => Some(CacheDomain::QaPairs),
            Some("export") => Some(CacheDomain::Export),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
