//! Inbound event feed
//!
//! The [`EventBus`] is the named-channel surface the notification transport
//! publishes [`ChangeEvent`]s onto. Subscribers receive events in delivery
//! order; a slow subscriber that falls behind the channel buffer is told how
//! many events it missed rather than silently losing them.
//!
//! The bus owns no transport of its own: a filesystem watcher, an IPC bridge,
//! or a test publishes into it directly.

use crate::types::ChangeEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Named broadcast channels carrying change events.
///
/// `publish` is synchronous and safe to call from any thread, so transport
/// callbacks (e.g. a watcher running on its own thread) can feed the bus
/// without an executor handle.
pub struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a named channel, creating it if needed.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let rx = self.sender(channel).subscribe();
        Subscription {
            channel: channel.to_string(),
            rx: Some(rx),
        }
    }

    /// Publish an event onto a named channel.
    ///
    /// Returns the number of subscribers that will observe the event.
    pub fn publish(&self, channel: &str, event: ChangeEvent) -> usize {
        self.sender(channel).send(event).unwrap_or(0)
    }

    /// Current subscriber count for a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<ChangeEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one bus channel.
///
/// Dropping the subscription unsubscribes; calling [`Subscription::unsubscribe`]
/// explicitly is idempotent and safe to repeat.
pub struct Subscription {
    channel: String,
    rx: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    /// Receive the next event in delivery order.
    ///
    /// Returns `None` once the subscription has been released or the channel
    /// closed. If this subscriber lagged behind the channel buffer, the
    /// dropped backlog is logged and reception continues with the oldest
    /// retained event.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        skipped,
                        "event feed lagged, dropping backlog"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Release the subscription. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.rx = None;
    }

    /// Whether the subscription is still attached to its channel.
    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Channel this subscription was created on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}
