//! Core domain types for seance
//!
//! These types describe the data the synchronization layer coordinates:
//! change notifications arriving from the session store, the view levels a
//! session can be rendered at, the cached shapes of a session's content, and
//! the monitor's observable state.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One recorded conversation in the underlying session store |
//! | **View level** | A named filtering mode applied store-side to a session's messages |
//! | **QA pair** | A question message optionally paired with its terminal answer |
//! | **Change event** | A "something changed on disk" notification from the transport |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================
// Change Events
// ============================================

/// Kind of change reported by the notification transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ChangeKind::Created),
            "modified" => Ok(ChangeKind::Modified),
            "deleted" => Ok(ChangeKind::Deleted),
            _ => Err(format!("unknown change kind: {}", s)),
        }
    }
}

/// A single change notification, produced externally and consumed once.
///
/// Events are immutable; the monitor only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened
    pub kind: ChangeKind,
    /// Path the change applies to
    pub path: PathBuf,
    /// Whether the transport considers this path part of the session store
    pub is_relevant: bool,
    /// When the transport observed the change
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Key used to drop duplicate deliveries of the same notification.
    ///
    /// Two events with the same kind, path and timestamp are considered one
    /// delivery; the transport is allowed to hand them to us more than once.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.as_str(),
            self.path.display(),
            self.timestamp.to_rfc3339()
        )
    }
}

// ============================================
// View Levels
// ============================================

/// A named filtering mode that determines which subset/shape of a session's
/// messages the store returns.
///
/// `Full` still parses (legacy stored preferences reference it) but is
/// deprecated and excluded from [`ViewLevel::active`]; [`ViewLevel::normalize`]
/// maps it to `Conversation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewLevel {
    /// Human and assistant messages in conversation order
    #[default]
    Conversation,
    /// Question/answer pairs instead of a flat message list
    QaPairs,
    /// Assistant messages only
    AssistantOnly,
    /// Human messages only
    UserOnly,
    /// Legacy "everything" level; normalizes to `Conversation`
    Full,
}

impl ViewLevel {
    /// The active, selectable levels. `Full` is deliberately absent.
    pub fn active() -> &'static [ViewLevel] {
        &[
            ViewLevel::Conversation,
            ViewLevel::QaPairs,
            ViewLevel::AssistantOnly,
            ViewLevel::UserOnly,
        ]
    }

    /// Map deprecated levels onto their active replacement.
    pub fn normalize(self) -> Self {
        match self {
            ViewLevel::Full => ViewLevel::Conversation,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewLevel::Conversation => "conversation",
            ViewLevel::QaPairs => "qa_pairs",
            ViewLevel::AssistantOnly => "assistant_only",
            ViewLevel::UserOnly => "user_only",
            ViewLevel::Full => "full",
        }
    }
}

impl std::fmt::Display for ViewLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ViewLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(ViewLevel::Conversation),
            "qa_pairs" => Ok(ViewLevel::QaPairs),
            "assistant_only" => Ok(ViewLevel::AssistantOnly),
            "user_only" => Ok(ViewLevel::UserOnly),
            "full" => Ok(ViewLevel::Full),
            _ => Err(format!("unknown view level: {}", s)),
        }
    }
}

// ============================================
// Cache Domains
// ============================================

/// The cached result families the coordinator manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    Preference,
    Messages,
    QaPairs,
    Export,
}

impl CacheDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDomain::Preference => "preference",
            CacheDomain::Messages => "messages",
            CacheDomain::QaPairs => "qa_pairs",
            CacheDomain::Export => "export",
        }
    }
}

impl std::fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Messages
// ============================================

/// Shape tag for a session message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    Summary,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::Assistant => "assistant",
            MessageKind::System => "system",
            MessageKind::Summary => "summary",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageKind::User),
            "assistant" => Ok(MessageKind::Assistant),
            "system" => Ok(MessageKind::System),
            "summary" => Ok(MessageKind::Summary),
            _ => Err(format!("unknown message kind: {}", s)),
        }
    }
}

/// A message within a session, as returned by the store.
///
/// Produced by the backend; the timeline normalizer only reorders and
/// flattens, it never mutates fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Store-assigned ID
    pub id: i64,
    /// Session this message belongs to
    pub session_id: String,
    /// Stable message identity
    pub uuid: String,
    /// Identity of the message this one replies to
    pub parent_uuid: Option<String>,
    /// Shape tag
    pub kind: MessageKind,
    /// Timestamp of this message
    pub ts: DateTime<Utc>,
    /// Byte offset for lazily paginated content (0 = full content)
    pub offset: i64,
    /// Byte length for lazily paginated content (0 = full content)
    pub length: i64,
    /// Short preview of the content
    pub summary: Option<String>,
}

/// A question message optionally paired with its terminal answer.
///
/// `answer: None` is a valid state: the store has not yet produced a
/// terminal response for the question. It is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: SessionMessage,
    pub answer: Option<SessionMessage>,
    /// Timestamp of the pair (the question's timestamp)
    pub ts: DateTime<Utc>,
}

// ============================================
// Monitor State
// ============================================

/// Observable state of the change monitor.
///
/// Created when monitoring starts, mutated only by the monitor's internal
/// handlers, reset to this default when monitoring is disabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorState {
    /// A refresh cycle is in flight (including its trailing settle delay)
    pub is_refreshing: bool,
    /// Accepted events since the last completed refresh
    pub pending_change_count: u32,
    /// Most recently accepted event
    pub last_event: Option<ChangeEvent>,
    /// Dedup key of the most recently accepted event
    pub last_event_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn event(kind: ChangeKind, path: &str, ts: &str) -> ChangeEvent {
        ChangeEvent {
            kind,
            path: PathBuf::from(path),
            is_relevant: true,
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
        }
    }

    #[test]
    fn test_dedup_key_components() {
        let a = event(ChangeKind::Modified, "/store/s1.jsonl", "2026-01-01T10:00:00Z");
        let b = event(ChangeKind::Modified, "/store/s1.jsonl", "2026-01-01T10:00:00Z");
        assert_eq!(a.dedup_key(), b.dedup_key());

        let c = event(ChangeKind::Deleted, "/store/s1.jsonl", "2026-01-01T10:00:00Z");
        assert_ne!(a.dedup_key(), c.dedup_key());

        let d = event(ChangeKind::Modified, "/store/s1.jsonl", "2026-01-01T10:00:01Z");
        assert_ne!(a.dedup_key(), d.dedup_key());
    }

    #[test]
    fn test_view_level_active_excludes_full() {
        assert!(!ViewLevel::active().contains(&ViewLevel::Full));
        assert_eq!(ViewLevel::active().len(), 4);
    }

    #[test]
    fn test_view_level_normalize() {
        assert_eq!(ViewLevel::Full.normalize(), ViewLevel::Conversation);
        assert_eq!(ViewLevel::QaPairs.normalize(), ViewLevel::QaPairs);
    }

    #[test]
    fn test_view_level_round_trip() {
        for level in ViewLevel::active() {
            assert_eq!(ViewLevel::from_str(level.as_str()).unwrap(), *level);
        }
        // legacy value still parses
        assert_eq!(ViewLevel::from_str("full").unwrap(), ViewLevel::Full);
        assert!(ViewLevel::from_str("everything").is_err());
    }

    #[test]
    fn test_view_level_default() {
        assert_eq!(ViewLevel::default(), ViewLevel::Conversation);
    }

    #[test]
    fn test_view_level_serde_snake_case() {
        let json = serde_json::to_string(&ViewLevel::QaPairs).unwrap();
        assert_eq!(json, "\"qa_pairs\"");
        let back: ViewLevel = serde_json::from_str("\"assistant_only\"").unwrap();
        assert_eq!(back, ViewLevel::AssistantOnly);
    }

    #[test]
    fn test_monitor_state_default() {
        let state = MonitorState::default();
        assert!(!state.is_refreshing);
        assert_eq!(state.pending_change_count, 0);
        assert!(state.last_event.is_none());
        assert!(state.last_event_id.is_none());
    }
}
