//! Level-scoped cache coordinator
//!
//! Keeps three dependent, independently-cached views of one session coherent:
//! the stored view preference, the message list, and the QA-pair list. Each
//! view lives in its own keyed slot with its own freshness window; a fetch
//! failure poisons only its own slot and never cascades to siblings.
//!
//! Per-key state machine: `Empty → Fetching → Fresh → Stale → Fetching…`,
//! with `Fresh → Empty` on explicit invalidation. Stale entries are served
//! while a background revalidation runs; reads never block on staleness.

mod entry;
mod key;

pub use entry::CachedEntry;
pub use key::CacheKey;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::rpc::SessionClient;
use crate::types::{CacheDomain, QaPair, SessionMessage, ViewLevel};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// One cached value. The variant is fixed by the slot's key domain.
#[derive(Debug, Clone)]
enum SlotValue {
    Preference(ViewLevel),
    Messages(Vec<SessionMessage>),
    QaPairs(Vec<QaPair>),
}

/// One keyed slot: the entry, the last fetch error, the per-key fetch lock
/// that guarantees at most one fetch in flight per key, and the slot's
/// generation.
///
/// Invalidation clears the entry but keeps the slot, so an in-flight fetch
/// still serializes against later readers on the same lock. The generation is
/// bumped on every invalidation; a fetch that started under an older
/// generation discards its result instead of storing it, so a slow
/// pre-invalidation fetch can never overwrite post-invalidation data.
struct Slot {
    entry: Option<CachedEntry<SlotValue>>,
    last_error: Option<String>,
    fetch_lock: Arc<tokio::sync::Mutex<()>>,
    generation: u64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            entry: None,
            last_error: None,
            fetch_lock: Arc::new(tokio::sync::Mutex::new(())),
            generation: 0,
        }
    }
}

#[derive(Clone, Copy)]
struct Windows {
    stale_after: Duration,
    ttl: Duration,
}

struct Inner {
    client: SessionClient,
    preference_windows: Windows,
    content_windows: Windows,
    refetch_interval: Duration,
    auto_refresh: bool,
    /// The slots mutex is held only for map bookkeeping, never across an
    /// await; fetches serialize on the per-slot async lock instead.
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

/// Coordinates the keyed store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<Inner>,
}

impl CacheCoordinator {
    pub fn new(client: SessionClient, config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                preference_windows: Windows {
                    stale_after: config.preference_stale_after(),
                    ttl: config.preference_ttl(),
                },
                content_windows: Windows {
                    stale_after: config.content_stale_after(),
                    ttl: config.content_ttl(),
                },
                refetch_interval: config.refetch_interval(),
                auto_refresh: config.auto_refresh,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The session's view preference, cached or fetched.
    ///
    /// Never errors: a session with no stored preference gets the default
    /// level, and a preference *fetch failure* also falls back to the default
    /// (logged as a warning) rather than blocking the surface on a view-mode
    /// lookup.
    pub async fn get_preference(&self, session_id: &str) -> ViewLevel {
        let key = CacheKey::preference(session_id);
        match self
            .get_or_fetch(key, CacheDomain::Preference, session_id, ViewLevel::default())
            .await
        {
            Ok(SlotValue::Preference(level)) => level,
            Ok(_) => ViewLevel::default(),
            Err(e) => {
                tracing::warn!(
                    session_id,
                    error = %e,
                    "preference fetch failed, using default view level"
                );
                ViewLevel::default()
            }
        }
    }

    /// The session's message list at a view level.
    ///
    /// For `level == QaPairs` the messages domain is idle: no fetch is issued
    /// and an empty list is returned, so the QA query stays the sole active
    /// fetch for that level.
    pub async fn get_messages(
        &self,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<Vec<SessionMessage>> {
        if level == ViewLevel::QaPairs {
            return Ok(Vec::new());
        }
        let key = CacheKey::messages(session_id, level);
        match self
            .get_or_fetch(key, CacheDomain::Messages, session_id, level)
            .await?
        {
            SlotValue::Messages(messages) => Ok(messages),
            _ => Ok(Vec::new()),
        }
    }

    /// The session's QA pairs. Idle (empty, no fetch) unless `level == QaPairs`.
    pub async fn get_qa_pairs(&self, session_id: &str, level: ViewLevel) -> Result<Vec<QaPair>> {
        if level != ViewLevel::QaPairs {
            return Ok(Vec::new());
        }
        let key = CacheKey::qa_pairs(session_id, level);
        match self
            .get_or_fetch(key, CacheDomain::QaPairs, session_id, level)
            .await?
        {
            SlotValue::QaPairs(pairs) => Ok(pairs),
            _ => Ok(Vec::new()),
        }
    }

    /// Switch the session's view level.
    ///
    /// Invalidation order matters: content for the old level, then the
    /// fire-and-forget preference persist, then content for the new level,
    /// and the preference key *last* so readers keep observing the old
    /// preference until the new one has been durably requested. Returns
    /// immediately; the persist outcome is only observable via logging.
    pub fn change_level(&self, session_id: &str, old_level: ViewLevel, new_level: ViewLevel) {
        self.invalidate_level(session_id, old_level);

        let client = self.inner.client.clone();
        let session = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.save_view_preference(&session, new_level).await {
                let err = Error::Persist {
                    session_id: session.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(session_id = %session, error = %err, "preference persist failed");
            }
        });

        self.invalidate_level(session_id, new_level);
        self.invalidate(&CacheKey::preference(session_id));

        tracing::debug!(session_id, old = %old_level, new = %new_level, "view level changed");
    }

    /// Invalidate and refetch until the three dependent views are current.
    ///
    /// Unlike [`CacheCoordinator::change_level`] this awaits the refetch, for
    /// callers that must not proceed until data is guaranteed current. The
    /// preference and the active content domain are refetched; the idle
    /// domain's key is left empty so its next read fetches post-invalidation
    /// data. No timeout of its own; callers needing an upper bound layer one
    /// externally.
    pub async fn force_refresh(&self, session_id: &str, level: ViewLevel) -> Result<()> {
        self.invalidate(&CacheKey::domain_prefix(CacheDomain::Preference, session_id));
        self.invalidate(&CacheKey::domain_prefix(CacheDomain::Messages, session_id));
        self.invalidate(&CacheKey::domain_prefix(CacheDomain::QaPairs, session_id));

        // Never fails; a fetch failure lands on the default level.
        let _ = self.get_preference(session_id).await;

        if level == ViewLevel::QaPairs {
            self.get_qa_pairs(session_id, level).await?;
        } else {
            self.get_messages(session_id, level).await?;
        }
        Ok(())
    }

    /// Drop every entry at or under `prefix`.
    ///
    /// Slots themselves survive so that an in-flight fetch keeps holding the
    /// same per-key lock; bumping the generation makes that fetch discard its
    /// result when it lands.
    pub fn invalidate(&self, prefix: &CacheKey) {
        let mut slots = self.inner.slots.lock().unwrap();
        for (key, slot) in slots.iter_mut() {
            if key.starts_with(prefix) {
                slot.entry = None;
                slot.last_error = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    /// Drop both content entries for one `(session, level)`.
    pub fn invalidate_level(&self, session_id: &str, level: ViewLevel) {
        self.invalidate(&CacheKey::messages(session_id, level));
        self.invalidate(&CacheKey::qa_pairs(session_id, level));
    }

    /// Periodically refetch the active content domain while a UI surface for
    /// it is open. Returns a guard; dropping it stops the refetch task.
    /// Inert when `auto_refresh` is disabled in the config.
    pub fn start_auto_refresh(&self, session_id: &str, level: ViewLevel) -> AutoRefreshGuard {
        if !self.inner.auto_refresh {
            return AutoRefreshGuard { token: None };
        }

        let token = CancellationToken::new();
        let this = self.clone();
        let session = session_id.to_string();
        let cancelled = token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.inner.refetch_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the immediate first tick; the surface already fetched on open
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let (key, domain) = if level == ViewLevel::QaPairs {
                            (CacheKey::qa_pairs(&session, level), CacheDomain::QaPairs)
                        } else {
                            (CacheKey::messages(&session, level), CacheDomain::Messages)
                        };
                        if let Err(e) = this.refetch(&key, domain, &session, level).await {
                            tracing::debug!(key = %key, error = %e, "auto refetch failed");
                        }
                    }
                }
            }
        });

        AutoRefreshGuard { token: Some(token) }
    }

    /// Last recorded fetch error for a key, if its most recent fetch failed.
    pub fn entry_error(&self, key: &CacheKey) -> Option<String> {
        let slots = self.inner.slots.lock().unwrap();
        slots.get(key).and_then(|slot| slot.last_error.clone())
    }

    /// Serve a servable entry, kicking off background revalidation when it
    /// has gone stale; otherwise fetch under the per-key lock.
    async fn get_or_fetch(
        &self,
        key: CacheKey,
        domain: CacheDomain,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<SlotValue> {
        let now = Utc::now();
        let (servable, needs_revalidate, fetch_lock) = {
            let mut slots = self.inner.slots.lock().unwrap();
            let slot = slots.entry(key.clone()).or_default();
            let fetch_lock = Arc::clone(&slot.fetch_lock);
            match &slot.entry {
                Some(entry) if !entry.is_expired(now) => (
                    Some(entry.value.clone()),
                    !entry.is_fresh(now),
                    fetch_lock,
                ),
                _ => (None, false, fetch_lock),
            }
        };

        if let Some(value) = servable {
            if needs_revalidate {
                self.spawn_revalidate(key, domain, session_id, level);
            }
            return Ok(value);
        }

        // Concurrent requests for the same key queue here and share the
        // winner's result via the double check below.
        let _guard = fetch_lock.lock().await;
        let now = Utc::now();
        {
            let slots = self.inner.slots.lock().unwrap();
            if let Some(entry) = slots.get(&key).and_then(|s| s.entry.as_ref()) {
                if !entry.is_expired(now) {
                    return Ok(entry.value.clone());
                }
            }
        }

        self.fetch_and_store(&key, domain, session_id, level).await
    }

    fn spawn_revalidate(&self, key: CacheKey, domain: CacheDomain, session_id: &str, level: ViewLevel) {
        let this = self.clone();
        let session = session_id.to_string();
        tokio::spawn(async move {
            let fetch_lock = this.fetch_lock_for(&key);
            let _guard = fetch_lock.lock().await;

            // another revalidation may have run while we waited
            let now = Utc::now();
            {
                let slots = this.inner.slots.lock().unwrap();
                if let Some(entry) = slots.get(&key).and_then(|s| s.entry.as_ref()) {
                    if entry.is_fresh(now) {
                        return;
                    }
                }
            }

            if let Err(e) = this.fetch_and_store(&key, domain, &session, level).await {
                tracing::debug!(key = %key, error = %e, "background revalidation failed");
            }
        });
    }

    /// Unconditional refetch under the per-key lock. Used by the periodic
    /// auto-refresh task, which refetches regardless of freshness.
    async fn refetch(
        &self,
        key: &CacheKey,
        domain: CacheDomain,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<()> {
        let fetch_lock = self.fetch_lock_for(key);
        let _guard = fetch_lock.lock().await;
        self.fetch_and_store(key, domain, session_id, level).await?;
        Ok(())
    }

    async fn fetch_and_store(
        &self,
        key: &CacheKey,
        domain: CacheDomain,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<SlotValue> {
        let windows = match domain {
            CacheDomain::Preference => self.inner.preference_windows,
            _ => self.inner.content_windows,
        };

        let generation = {
            let mut slots = self.inner.slots.lock().unwrap();
            slots.entry(key.clone()).or_default().generation
        };

        match self.fetch_value(domain, session_id, level).await {
            Ok(value) => {
                let mut slots = self.inner.slots.lock().unwrap();
                let slot = slots.entry(key.clone()).or_default();
                if slot.generation == generation {
                    slot.entry = Some(CachedEntry::new(
                        value.clone(),
                        windows.stale_after,
                        windows.ttl,
                    ));
                    slot.last_error = None;
                } else {
                    // the key was invalidated while this fetch was in flight
                    tracing::debug!(key = %key, "discarding superseded fetch result");
                }
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut slots = self.inner.slots.lock().unwrap();
                    let slot = slots.entry(key.clone()).or_default();
                    if slot.generation == generation {
                        slot.last_error = Some(message.clone());
                    }
                }
                Err(Error::Fetch {
                    key: key.to_string(),
                    message,
                })
            }
        }
    }

    async fn fetch_value(
        &self,
        domain: CacheDomain,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<SlotValue> {
        match domain {
            CacheDomain::Preference => {
                let stored = self.inner.client.view_preference(session_id).await?;
                Ok(SlotValue::Preference(
                    stored.unwrap_or_default().normalize(),
                ))
            }
            CacheDomain::Messages => Ok(SlotValue::Messages(
                self.inner.client.session_messages(session_id, level).await?,
            )),
            CacheDomain::QaPairs => Ok(SlotValue::QaPairs(
                self.inner.client.session_qa_pairs(session_id, level).await?,
            )),
            // export entries are populated by their producers, not fetched here
            CacheDomain::Export => Err(Error::Fetch {
                key: CacheDomain::Export.to_string(),
                message: "export entries have no fetcher".to_string(),
            }),
        }
    }

    fn fetch_lock_for(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.inner.slots.lock().unwrap();
        Arc::clone(&slots.entry(key.clone()).or_default().fetch_lock)
    }
}

/// Stops the periodic refetch for one surface when dropped.
pub struct AutoRefreshGuard {
    token: Option<CancellationToken>,
}

impl AutoRefreshGuard {
    /// Whether a refetch task is actually running behind this guard.
    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }

    /// Stop the refetch task now instead of waiting for drop.
    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

impl Drop for AutoRefreshGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
