//! QA-to-timeline normalizer
//!
//! Pure reshaping of QA pairs into one reverse-chronological message feed.

use crate::types::{QaPair, SessionMessage};

/// Flatten QA pairs into a single message sequence, newest first.
///
/// Each pair emits its question, then its answer when present; a pair whose
/// answer is still pending is valid and simply emits one message. The merged
/// sequence is sorted by timestamp descending to match a reverse-chronological
/// feed. The sort is stable, so messages with equal timestamps keep their
/// emission order (pair order, question before answer); this tie-break is
/// deliberate, not an accident of the algorithm.
///
/// Inputs are never mutated; output messages carry `offset = 0, length = 0`
/// to signal full, non-paginated content.
pub fn from_qa_pairs(pairs: &[QaPair]) -> Vec<SessionMessage> {
    let mut timeline = Vec::with_capacity(pairs.len() * 2);

    for pair in pairs {
        timeline.push(full_content(&pair.question));
        if let Some(answer) = &pair.answer {
            timeline.push(full_content(answer));
        }
    }

    timeline.sort_by(|a, b| b.ts.cmp(&a.ts));
    timeline
}

fn full_content(message: &SessionMessage) -> SessionMessage {
    let mut out = message.clone();
    out.offset = 0;
    out.length = 0;
    out
}
