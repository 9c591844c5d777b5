//! Change event monitor
//!
//! Listens to a bus channel, deduplicates and debounces bursts of change
//! events, and triggers a single coalesced refresh once the feed goes quiet.
//!
//! The monitor runs as one reactor task. Events are handled strictly in
//! delivery order and each is handled to completion before the next, so the
//! dedup check and the debounce reset can never interleave. The debounce
//! timer is an owned `Option<Instant>` select arm rather than a detached
//! callback, which makes teardown deterministic: cancelling the reactor kills
//! the timer with it.

use crate::error::Error;
use crate::events::{EventBus, Subscription};
use crate::types::{ChangeEvent, MonitorState};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Synchronous per-event callback.
pub type ChangeFn = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Future returned by the refresh callback.
pub type RefreshFuture = Pin<Box<dyn Future<Output = crate::error::Result<()>> + Send>>;

/// Coalesced refresh callback. May be slow; it runs off the reactor so event
/// intake stays responsive.
pub type RefreshFn = Arc<dyn Fn() -> RefreshFuture + Send + Sync>;

/// Callbacks supplied by the calling surface.
#[derive(Clone)]
pub struct MonitorCallbacks {
    pub on_change: ChangeFn,
    pub on_refresh: RefreshFn,
}

/// Monitor timing and the enabled toggle.
#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    /// When false, no subscription is made at all
    pub enabled: bool,
    /// Quiet period after the last accepted event before the refresh fires
    pub debounce_window: Duration,
    /// Trailing delay before the refreshing flag clears, so UI indicators do
    /// not flicker when a refresh completes near-instantly
    pub settle_delay: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_window: Duration::from_millis(300),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Owns the reactor task and exposes the monitor's control surface.
///
/// Every exit path (disable, shutdown, feed closed, drop) releases the
/// subscription and drops any pending debounce deadline.
pub struct ChangeMonitor {
    bus: Arc<EventBus>,
    channel: String,
    options: MonitorOptions,
    callbacks: MonitorCallbacks,
    state: Arc<Mutex<MonitorState>>,
    /// Refresh-cycle epoch. Bumped when a new cycle starts and when the
    /// monitor is disabled; a completed cycle only clears the refreshing flag
    /// if it is still the newest epoch, so a stale in-flight refresh cannot
    /// clobber state the monitor has since reset.
    epoch: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl ChangeMonitor {
    /// Start monitoring a bus channel.
    ///
    /// If `options.enabled` is false the monitor comes up disabled: no
    /// subscription is made until [`ChangeMonitor::set_enabled`] turns it on.
    pub fn start(
        bus: Arc<EventBus>,
        channel: &str,
        options: MonitorOptions,
        callbacks: MonitorCallbacks,
    ) -> Self {
        let mut monitor = Self {
            bus,
            channel: channel.to_string(),
            options,
            callbacks,
            state: Arc::new(Mutex::new(MonitorState::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            handle: None,
            cancel: None,
        };
        if monitor.options.enabled {
            monitor.spawn_reactor();
        }
        monitor
    }

    /// Snapshot of the observable monitor state.
    pub fn state(&self) -> MonitorState {
        self.state.lock().unwrap().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.cancel.is_some()
    }

    /// Toggle monitoring. Disabling tears down the subscription, cancels any
    /// pending debounce deadline, and resets the state to its initial value;
    /// an in-flight refresh is allowed to complete but its result is
    /// discarded. Enabling re-subscribes.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.is_enabled() {
            return;
        }
        if enabled {
            self.spawn_reactor();
        } else {
            self.teardown();
        }
    }

    /// Disable monitoring. Idempotent.
    pub fn shutdown(&mut self) {
        self.teardown();
    }

    /// Run a refresh cycle now, independent of the debounce timer.
    pub fn trigger_refresh(&self) {
        spawn_refresh_cycle(
            Arc::clone(&self.state),
            Arc::clone(&self.epoch),
            Arc::clone(&self.callbacks.on_refresh),
            self.options.settle_delay,
        );
    }

    fn spawn_reactor(&mut self) {
        let cancel = CancellationToken::new();
        let reactor = Reactor {
            sub: self.bus.subscribe(&self.channel),
            options: self.options,
            callbacks: self.callbacks.clone(),
            state: Arc::clone(&self.state),
            epoch: Arc::clone(&self.epoch),
            cancel: cancel.clone(),
        };
        tracing::debug!(channel = %self.channel, "change monitor listening");
        self.handle = Some(tokio::spawn(reactor.run()));
        self.cancel = Some(cancel);
    }

    fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.handle = None;
        // Invalidate any in-flight refresh cycle before resetting state
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = MonitorState::default();
        tracing::debug!(channel = %self.channel, "change monitor disabled");
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

struct Reactor {
    sub: Subscription,
    options: MonitorOptions,
    callbacks: MonitorCallbacks,
    state: Arc<Mutex<MonitorState>>,
    epoch: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Reactor {
    async fn run(mut self) {
        // Owned, nullable debounce deadline: a new accepted event replaces
        // it, extending the quiet period instead of queuing a second trigger.
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.sub.recv() => {
                    match event {
                        Some(event) => {
                            if self.handle_event(&event) {
                                deadline = Some(Instant::now() + self.options.debounce_window);
                            }
                        }
                        None => {
                            tracing::debug!(channel = %self.sub.channel(), "event feed closed");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() => {
                    deadline = None;
                    spawn_refresh_cycle(
                        Arc::clone(&self.state),
                        Arc::clone(&self.epoch),
                        Arc::clone(&self.callbacks.on_refresh),
                        self.options.settle_delay,
                    );
                }
            }
        }

        self.sub.unsubscribe();
    }

    /// Returns true when the event was accepted and the debounce window
    /// should be (re)started.
    fn handle_event(&mut self, event: &ChangeEvent) -> bool {
        if !event.is_relevant {
            return false;
        }

        let key = event.dedup_key();
        {
            let mut state = self.state.lock().unwrap();
            // The transport may deliver one notification twice; compare
            // against the last *accepted* key so A,A,A collapses to one.
            if state.last_event_id.as_deref() == Some(key.as_str()) {
                tracing::trace!(key = %key, "dropping duplicate change event");
                return false;
            }
            state.last_event_id = Some(key);
            state.last_event = Some(event.clone());
            state.pending_change_count += 1;
        }

        (self.callbacks.on_change)(event);
        true
    }
}

/// Run one refresh cycle on its own task: mark refreshing, await the
/// callback, hold the trailing settle delay, then clear the flag and zero the
/// pending count. A callback error is logged as non-fatal and never
/// re-thrown; the settle delay and flag clearing happen regardless.
fn spawn_refresh_cycle(
    state: Arc<Mutex<MonitorState>>,
    epoch: Arc<AtomicU64>,
    on_refresh: RefreshFn,
    settle_delay: Duration,
) {
    let cycle = epoch.fetch_add(1, Ordering::SeqCst) + 1;
    state.lock().unwrap().is_refreshing = true;

    tokio::spawn(async move {
        if let Err(e) = on_refresh().await {
            let err = Error::Refresh(e.to_string());
            tracing::warn!(error = %err, "refresh callback failed");
        }

        tokio::time::sleep(settle_delay).await;

        // Only the newest cycle may clear the flag; a superseded or
        // disabled-while-running cycle discards its result.
        if epoch.load(Ordering::SeqCst) == cycle {
            let mut state = state.lock().unwrap();
            state.is_refreshing = false;
            state.pending_change_count = 0;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn event_at(path: &str, ts: &str) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Modified,
            path: PathBuf::from(path),
            is_relevant: true,
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
        }
    }

    struct Counters {
        changes: AtomicUsize,
        refreshes: AtomicUsize,
    }

    fn callbacks(counters: &Arc<Counters>) -> MonitorCallbacks {
        let changes = Arc::clone(counters);
        let refreshes = Arc::clone(counters);
        MonitorCallbacks {
            on_change: Arc::new(move |_| {
                changes.changes.fetch_add(1, Ordering::SeqCst);
            }),
            on_refresh: Arc::new(move || {
                refreshes.refreshes.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            }),
        }
    }

    fn counters() -> Arc<Counters> {
        Arc::new(Counters {
            changes: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        })
    }

    fn options() -> MonitorOptions {
        MonitorOptions {
            enabled: true,
            debounce_window: Duration::from_millis(300),
            settle_delay: Duration::from_millis(500),
        }
    }

    async fn settle() {
        // Let the reactor drain its queue under the paused clock
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_events_are_dropped() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks(&counters));

        let e = event_at("/store/s1.jsonl", "2026-01-01T10:00:00Z");
        bus.publish("store", e.clone());
        bus.publish("store", e.clone());
        bus.publish("store", e);
        settle().await;

        assert_eq!(counters.changes.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.state().pending_change_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_irrelevant_events_are_ignored() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks(&counters));

        let mut e = event_at("/store/notes.txt", "2026-01-01T10:00:00Z");
        e.is_relevant = false;
        bus.publish("store", e);
        settle().await;

        assert_eq!(counters.changes.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.state().pending_change_count, 0);
        assert!(monitor.state().last_event.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_burst_into_one_refresh() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let _monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks(&counters));

        // three distinct events 100ms apart, all inside the 300ms window
        for i in 0..3 {
            bus.publish(
                "store",
                event_at("/store/s1.jsonl", &format!("2026-01-01T10:00:0{}Z", i)),
            );
            settle().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // 100ms after the last event: window not yet elapsed
        assert_eq!(counters.refreshes.load(Ordering::SeqCst), 0);

        // cross the 300ms mark measured from the *last* event
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(counters.refreshes.load(Ordering::SeqCst), 1);

        // and no further trigger afterwards
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counters.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshing_flag_holds_through_settle_delay() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks(&counters));

        bus.publish("store", event_at("/store/s1.jsonl", "2026-01-01T10:00:00Z"));
        settle().await;
        tokio::time::sleep(Duration::from_millis(310)).await;

        // refresh fired; flag stays up during the 500ms settle delay
        assert_eq!(counters.refreshes.load(Ordering::SeqCst), 1);
        assert!(monitor.state().is_refreshing);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let state = monitor.state();
        assert!(!state.is_refreshing);
        assert_eq!(state.pending_change_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_is_contained() {
        let bus = Arc::new(EventBus::new());
        let refreshes = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&refreshes);
        let callbacks = MonitorCallbacks {
            on_change: Arc::new(|_| {}),
            on_refresh: Arc::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err(Error::Refresh("backend down".to_string())) })
            }),
        };
        let monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks);

        bus.publish("store", event_at("/store/s1.jsonl", "2026-01-01T10:00:00Z"));
        settle().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        // the error was swallowed and the flag still cleared via the settle delay
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert!(!monitor.state().is_refreshing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_refresh_is_independent_of_timer() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks(&counters));

        monitor.trigger_refresh();
        settle().await;
        assert_eq!(counters.refreshes.load(Ordering::SeqCst), 1);
        assert!(monitor.state().is_refreshing);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!monitor.state().is_refreshing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_clears_state_and_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let mut monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks(&counters));

        bus.publish("store", event_at("/store/s1.jsonl", "2026-01-01T10:00:00Z"));
        settle().await;
        assert_eq!(monitor.state().pending_change_count, 1);

        monitor.set_enabled(false);
        settle().await;
        assert!(!monitor.is_enabled());
        assert_eq!(monitor.state(), MonitorState::default());
        assert_eq!(bus.subscriber_count("store"), 0);

        // pending debounce deadline died with the reactor: no refresh fires
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counters.refreshes.load(Ordering::SeqCst), 0);

        // shutdown after disable is a no-op
        monitor.shutdown();
        assert!(!monitor.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_start_makes_no_subscription() {
        let bus = Arc::new(EventBus::new());
        let counters = counters();
        let mut opts = options();
        opts.enabled = false;
        let mut monitor = ChangeMonitor::start(bus.clone(), "store", opts, callbacks(&counters));

        assert!(!monitor.is_enabled());
        assert_eq!(bus.subscriber_count("store"), 0);

        // re-enable subscribes and events flow again
        monitor.set_enabled(true);
        settle().await;
        assert_eq!(bus.subscriber_count("store"), 1);
        bus.publish("store", event_at("/store/s1.jsonl", "2026-01-01T10:00:00Z"));
        settle().await;
        assert_eq!(counters.changes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_during_refresh_discards_its_result() {
        let bus = Arc::new(EventBus::new());
        let callbacks = MonitorCallbacks {
            on_change: Arc::new(|_| {}),
            on_refresh: Arc::new(|| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                })
            }),
        };
        let mut monitor = ChangeMonitor::start(bus.clone(), "store", options(), callbacks);

        monitor.trigger_refresh();
        settle().await;
        assert!(monitor.state().is_refreshing);

        // disable mid-refresh: state resets now, and the cycle finishing
        // later must not resurrect or re-clear anything
        monitor.set_enabled(false);
        assert_eq!(monitor.state(), MonitorState::default());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.state(), MonitorState::default());
    }
}
