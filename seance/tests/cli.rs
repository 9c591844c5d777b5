//! CLI acceptance tests for the seance binaries

use assert_cmd::Command;
use chrono::{DateTime, Utc};
use seance_core::types::{MessageKind, QaPair, SessionMessage};
use tempfile::TempDir;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn message(uuid: &str, parent: Option<&str>, kind: MessageKind, at: &str) -> SessionMessage {
    SessionMessage {
        id: 0,
        session_id: "s1".to_string(),
        uuid: uuid.to_string(),
        parent_uuid: parent.map(str::to_string),
        kind,
        ts: ts(at),
        offset: 0,
        length: 0,
        summary: Some(format!("summary of {}", uuid)),
    }
}

/// Point the binaries' XDG paths at a sandbox so tests never touch the
/// user's real config or logs.
fn sandboxed(bin: &str, home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(bin).unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_STATE_HOME", home.path().join("state"));
    cmd
}

#[test]
fn test_watch_help_lists_flags() {
    let home = TempDir::new().unwrap();
    let output = sandboxed("seance-watch", &home).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--root"));
    assert!(stdout.contains("--session"));
    assert!(stdout.contains("--once"));
}

#[test]
fn test_watch_once_reports_message_count() {
    let home = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();

    let lines = [
        message("q1", None, MessageKind::User, "2026-01-01T10:00:00Z"),
        message("a1", Some("q1"), MessageKind::Assistant, "2026-01-01T10:00:05Z"),
        message("sys", None, MessageKind::System, "2026-01-01T10:00:06Z"),
    ]
    .iter()
    .map(|m| serde_json::to_string(m).unwrap())
    .collect::<Vec<_>>()
    .join("\n");
    std::fs::write(store.path().join("s1.jsonl"), lines).unwrap();

    let output = sandboxed("seance-watch", &home)
        .arg("--root")
        .arg(store.path())
        .arg("--session")
        .arg("s1")
        .arg("--once")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    // conversation level admits user + assistant, not system
    assert!(stdout.contains("2 messages"), "stdout: {}", stdout);
    assert!(stdout.contains("level conversation"), "stdout: {}", stdout);
}

#[test]
fn test_watch_once_qa_level() {
    let home = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();

    let lines = [
        message("q1", None, MessageKind::User, "2026-01-01T10:00:00Z"),
        message("a1", Some("q1"), MessageKind::Assistant, "2026-01-01T10:00:05Z"),
        message("q2", None, MessageKind::User, "2026-01-01T10:01:00Z"),
    ]
    .iter()
    .map(|m| serde_json::to_string(m).unwrap())
    .collect::<Vec<_>>()
    .join("\n");
    std::fs::write(store.path().join("s1.jsonl"), lines).unwrap();

    let output = sandboxed("seance-watch", &home)
        .arg("--root")
        .arg(store.path())
        .arg("--session")
        .arg("s1")
        .arg("--level")
        .arg("qa_pairs")
        .arg("--once")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    // two pairs, one still unanswered: three timeline messages
    assert!(stdout.contains("2 qa pairs"), "stdout: {}", stdout);
    assert!(stdout.contains("3 timeline messages"), "stdout: {}", stdout);
}

#[test]
fn test_watch_missing_store_fails() {
    let home = TempDir::new().unwrap();
    sandboxed("seance-watch", &home)
        .arg("--root")
        .arg("/nonexistent/store")
        .arg("--session")
        .arg("s1")
        .arg("--once")
        .assert()
        .failure();
}

#[test]
fn test_timeline_prints_newest_first() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    let pairs = vec![
        QaPair {
            ts: ts("2026-01-01T10:00:00Z"),
            question: message("q1", None, MessageKind::User, "2026-01-01T10:00:00Z"),
            answer: Some(message("a1", Some("q1"), MessageKind::Assistant, "2026-01-01T10:00:05Z")),
        },
        QaPair {
            ts: ts("2026-01-01T10:05:00Z"),
            question: message("q2", None, MessageKind::User, "2026-01-01T10:05:00Z"),
            answer: None,
        },
    ];
    let file = dir.path().join("pairs.json");
    std::fs::write(&file, serde_json::to_string(&pairs).unwrap()).unwrap();

    let output = sandboxed("seance-timeline", &home).arg(&file).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    // newest first: the unanswered q2 leads the feed
    assert!(lines[0].contains("q2"));
    assert!(lines[1].contains("a1"));
    assert!(lines[2].contains("q1"));
    assert!(lines[3].contains("2 pairs -> 3 messages"));
}

#[test]
fn test_timeline_rejects_malformed_input() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.json");
    std::fs::write(&file, "{not json").unwrap();

    sandboxed("seance-timeline", &home).arg(&file).assert().failure();
}
