//! Deduplicator: decides which conversations need (re)writing
//!
//! Given a normalized conversation and the store's current record for its id,
//! compares message sets by id. This is what makes re-scanning a source safe
//! and cheap: the scheduler can poll liberally without growing the store.

use crate::store::StoreView;
use crate::types::{Conversation, Message};
use std::collections::BTreeSet;

/// Per-conversation deduplication outcome.
#[derive(Debug, Clone)]
pub enum DedupOutcome {
    /// No existing record; the full pipeline runs
    New,
    /// Existing record found and new messages are present; the record is
    /// re-merged with facts recomputed over the merged set
    Extended {
        /// Messages whose ids the store has not seen
        new_messages: Vec<Message>,
    },
    /// All message ids already present; skipped entirely, no write
    Unchanged,
}

impl DedupOutcome {
    /// Whether the conversation needs a store write at all.
    pub fn needs_write(&self) -> bool {
        !matches!(self, DedupOutcome::Unchanged)
    }
}

/// Classify one conversation against a consistent store snapshot.
pub fn classify(conversation: &Conversation, view: &StoreView) -> DedupOutcome {
    let Some(record) = view.record(&conversation.id) else {
        return DedupOutcome::New;
    };

    let known: BTreeSet<&str> = record.message_ids.iter().map(String::as_str).collect();
    let new_messages: Vec<Message> = conversation
        .messages
        .iter()
        .filter(|m| !known.contains(m.id.as_str()))
        .cloned()
        .collect();

    if new_messages.is_empty() {
        DedupOutcome::Unchanged
    } else {
        DedupOutcome::Extended { new_messages }
    }
}

/// Filter a batch down to the conversations requiring a (re)write.
pub fn filter_new(
    conversations: Vec<Conversation>,
    view: &StoreView,
) -> Vec<(Conversation, DedupOutcome)> {
    conversations
        .into_iter()
        .filter_map(|conv| {
            let outcome = classify(&conv, view);
            if outcome.needs_write() {
                Some((conv, outcome))
            } else {
                tracing::debug!(conversation_id = %conv.id, "Unchanged, skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchiveTier, ConsolidationRecord, Platform, Role};
    use chrono::{TimeZone, Utc};

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            role: Role::Human,
            content: "text".to_string(),
            ts: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            platform: Platform::Augment,
            seq: None,
        }
    }

    fn conversation(ids: &[&str]) -> Conversation {
        let messages: Vec<Message> = ids.iter().map(|id| message(id)).collect();
        Conversation {
            id: "c1".to_string(),
            platform: Platform::Augment,
            started_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ended_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            messages,
            timestamp_substituted: false,
        }
    }

    fn view_with(ids: &[&str]) -> StoreView {
        let record = ConsolidationRecord {
            conversation_id: "c1".to_string(),
            ts: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            platform: Platform::Augment,
            summary: None,
            decision_count: 0,
            action_count: 0,
            technical_work_count: 0,
            message_count: ids.len() as u64,
            message_ids: ids.iter().map(|s| s.to_string()).collect(),
            tier: ArchiveTier::Recent,
        };
        StoreView::from_records(vec![record])
    }

    #[test]
    fn test_new_conversation() {
        let view = StoreView::from_records(vec![]);
        assert!(matches!(
            classify(&conversation(&["m1"]), &view),
            DedupOutcome::New
        ));
    }

    #[test]
    fn test_unchanged_conversation() {
        let view = view_with(&["m1", "m2"]);
        let outcome = classify(&conversation(&["m1", "m2"]), &view);
        assert!(matches!(outcome, DedupOutcome::Unchanged));
        assert!(!outcome.needs_write());
    }

    #[test]
    fn test_extended_conversation_yields_only_new_messages() {
        let view = view_with(&["m1", "m2"]);
        match classify(&conversation(&["m1", "m2", "m3"]), &view) {
            DedupOutcome::Extended { new_messages } => {
                assert_eq!(new_messages.len(), 1);
                assert_eq!(new_messages[0].id, "m3");
            }
            other => panic!("expected Extended, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_new_drops_unchanged() {
        let view = view_with(&["m1"]);
        let batch = vec![conversation(&["m1"])];
        assert!(filter_new(batch, &view).is_empty());
    }
}
