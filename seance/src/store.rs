//! Directory-backed demo session store
//!
//! Implements [`SessionBackend`] over a plain directory so the watcher binary
//! has something real to exercise:
//!
//! - `<root>/<session>.jsonl`: one [`SessionMessage`] JSON object per line
//! - `<root>/preferences.json`: map of session id to stored view level
//!
//! Level filtering and QA pairing happen store-side, mirroring the contract
//! that the backend returns already-shaped results. This is demo plumbing:
//! the real session store's persistence format is owned elsewhere.

use seance_core::rpc::{BackendFuture, SessionBackend};
use seance_core::types::{MessageKind, QaPair, SessionMessage, ViewLevel};
use seance_core::{Error, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

pub struct JsonStoreBackend {
    root: PathBuf,
}

impl JsonStoreBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn preferences_path(&self) -> PathBuf {
        self.root.join("preferences.json")
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", session_id))
    }

    fn load_preferences(&self) -> Result<HashMap<String, ViewLevel>> {
        let path = self.preferences_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_preferences(&self, preferences: &HashMap<String, ViewLevel>) -> Result<()> {
        let content = serde_json::to_string_pretty(preferences)?;
        std::fs::write(self.preferences_path(), content)?;
        Ok(())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Err(Error::Backend {
                operation: "list_session_messages".to_string(),
                message: format!("session not found: {}", session_id),
            });
        }

        let file = std::fs::File::open(&path)?;
        let mut messages = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            messages.push(serde_json::from_str(&line)?);
        }
        messages.sort_by(|a: &SessionMessage, b: &SessionMessage| a.ts.cmp(&b.ts));
        Ok(messages)
    }

    fn session_id_arg(args: &serde_json::Value, operation: &str) -> Result<String> {
        args["session_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Backend {
                operation: operation.to_string(),
                message: "missing session_id argument".to_string(),
            })
    }

    fn level_arg(args: &serde_json::Value) -> ViewLevel {
        serde_json::from_value(args["level"].clone()).unwrap_or_default()
    }
}

impl SessionBackend for JsonStoreBackend {
    fn call<'a>(&'a self, operation: &'a str, args: serde_json::Value) -> BackendFuture<'a> {
        Box::pin(async move {
            match operation {
                "get_view_preference" => {
                    let session_id = Self::session_id_arg(&args, operation)?;
                    let preferences = self.load_preferences()?;
                    Ok(serde_json::to_value(preferences.get(&session_id))?)
                }
                "save_view_preference" => {
                    let session_id = Self::session_id_arg(&args, operation)?;
                    let level = Self::level_arg(&args);
                    let mut preferences = self.load_preferences()?;
                    preferences.insert(session_id, level);
                    self.save_preferences(&preferences)?;
                    Ok(serde_json::Value::Null)
                }
                "list_session_messages" => {
                    let session_id = Self::session_id_arg(&args, operation)?;
                    let level = Self::level_arg(&args);
                    let messages = self.load_messages(&session_id)?;
                    let shaped: Vec<SessionMessage> = messages
                        .into_iter()
                        .filter(|m| level_admits(level, m.kind))
                        .collect();
                    Ok(serde_json::to_value(shaped)?)
                }
                "list_session_qa_pairs" => {
                    let session_id = Self::session_id_arg(&args, operation)?;
                    let messages = self.load_messages(&session_id)?;
                    Ok(serde_json::to_value(pair_messages(messages))?)
                }
                other => Err(Error::Backend {
                    operation: other.to_string(),
                    message: "unknown operation".to_string(),
                }),
            }
        })
    }
}

/// Store-side level shaping for the flat message list.
fn level_admits(level: ViewLevel, kind: MessageKind) -> bool {
    match level.normalize() {
        ViewLevel::Conversation => matches!(kind, MessageKind::User | MessageKind::Assistant),
        ViewLevel::AssistantOnly => kind == MessageKind::Assistant,
        ViewLevel::UserOnly => kind == MessageKind::User,
        // the QA shape is served by list_session_qa_pairs, not here
        _ => false,
    }
}

/// Pair each user message with the next assistant reply.
///
/// A reply is matched by `parent_uuid` when set; otherwise the first
/// assistant message after an open question closes it. A question with no
/// terminal reply yet stays an open pair with `answer: None`.
fn pair_messages(messages: Vec<SessionMessage>) -> Vec<QaPair> {
    let mut pairs: Vec<QaPair> = Vec::new();
    let mut open: Option<usize> = None;

    for message in messages {
        match message.kind {
            MessageKind::User => {
                pairs.push(QaPair {
                    ts: message.ts,
                    question: message,
                    answer: None,
                });
                open = Some(pairs.len() - 1);
            }
            MessageKind::Assistant => {
                if let Some(index) = open {
                    let matches_parent = match &message.parent_uuid {
                        Some(parent) => *parent == pairs[index].question.uuid,
                        None => true,
                    };
                    if matches_parent {
                        pairs[index].answer = Some(message);
                        open = None;
                    }
                }
            }
            _ => {}
        }
    }

    pairs
}

/// Whether a changed path is part of the session store.
pub fn is_store_path(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
        && path
            .extension()
            .map(|ext| ext == "jsonl")
            .unwrap_or(false)
}
