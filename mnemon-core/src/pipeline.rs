//! Per-artifact pipeline: parse, normalize, dedup, extract, commit
//!
//! One artifact flows through here as a unit. The caller (the scheduler)
//! treats the whole run as atomic with respect to its cursor: only when this
//! function returns `Ok` may the artifact's marker be committed and its
//! cleanup invoked.

use crate::error::Result;
use crate::sources::{SourceArtifact, SourceParser};
use crate::store::Store;
use crate::types::{Conversation, Message};
use crate::{dedup, extract, normalize};
use std::collections::BTreeMap;

const MAX_WARNINGS: usize = 10;

/// Counts and warnings from one artifact's run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// New consolidation records created
    pub conversations_new: usize,
    /// Existing records merged with new messages
    pub conversations_merged: usize,
    /// Messages written to the store
    pub messages_added: usize,
    /// Unit-level parse errors and timestamp substitutions
    pub warnings: Vec<String>,
}

impl PipelineReport {
    /// Whether the artifact produced any store write.
    pub fn wrote(&self) -> bool {
        self.conversations_new + self.conversations_merged > 0
    }
}

/// Run one artifact through the full pipeline.
///
/// Re-running with the same artifact is idempotent: the deduplicator turns
/// already-committed conversations into no-ops.
pub fn process_artifact(
    parser: &dyn SourceParser,
    artifact: &SourceArtifact,
    store: &Store,
) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();

    let parsed = parser.parse(artifact)?;
    for err in parsed.unit_errors {
        if report.warnings.len() < MAX_WARNINGS {
            report.warnings.push(err);
        }
    }

    let conversations: Vec<Conversation> = parsed
        .conversations
        .into_iter()
        .map(normalize::normalize)
        .filter(|c| !c.messages.is_empty())
        .collect();

    let view = store.snapshot()?;
    for (conversation, outcome) in dedup::filter_new(conversations, &view) {
        if conversation.timestamp_substituted && report.warnings.len() < MAX_WARNINGS {
            report.warnings.push(format!(
                "conversation {} carried unparseable timestamps, discovery time substituted",
                conversation.id
            ));
        }

        match outcome {
            dedup::DedupOutcome::New => {
                let facts = extract::extract(&conversation);
                store.commit(&conversation, &facts)?;
                report.conversations_new += 1;
                report.messages_added += conversation.messages.len();
            }
            dedup::DedupOutcome::Extended { new_messages } => {
                // Recompute facts over the full merged message set when the
                // detail is still on hand; a record whose detail was demoted
                // away gets facts over just the new slice, which the store
                // folds in additively.
                let stored = store.load_messages(&conversation.id)?;
                let facts = if stored.is_empty() {
                    extract::extract(&with_messages(&conversation, new_messages.clone()))
                } else {
                    extract::extract(&merge_detail(&conversation, stored))
                };
                store.commit(&conversation, &facts)?;
                report.conversations_merged += 1;
                report.messages_added += new_messages.len();
            }
            dedup::DedupOutcome::Unchanged => {}
        }
    }

    tracing::debug!(
        artifact = %artifact.reference(),
        new = report.conversations_new,
        merged = report.conversations_merged,
        messages = report.messages_added,
        "Artifact processed"
    );

    Ok(report)
}

/// The conversation with its message set replaced.
fn with_messages(conversation: &Conversation, messages: Vec<Message>) -> Conversation {
    let started_at = messages
        .first()
        .map(|m| m.ts)
        .unwrap_or(conversation.started_at);
    let ended_at = messages
        .last()
        .map(|m| m.ts)
        .unwrap_or(conversation.ended_at);
    Conversation {
        id: conversation.id.clone(),
        platform: conversation.platform,
        messages,
        started_at,
        ended_at,
        timestamp_substituted: conversation.timestamp_substituted,
    }
}

/// Union the incoming conversation with stored detail, ordered by timestamp.
fn merge_detail(conversation: &Conversation, stored: Vec<Message>) -> Conversation {
    let mut by_id: BTreeMap<String, Message> = stored
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();
    for message in &conversation.messages {
        by_id
            .entry(message.id.clone())
            .or_insert_with(|| message.clone());
    }

    let mut messages: Vec<Message> = by_id.into_values().collect();
    messages.sort_by(|a, b| (a.ts, a.seq, &a.id).cmp(&(b.ts, b.seq, &b.id)));
    with_messages(conversation, messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ParsedArtifact, RawConversation, RawMessage, RawTimestamp};
    use crate::types::{Platform, SourceCursor};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Parser returning a canned batch, for exercising the pipeline alone.
    struct CannedParser {
        conversations: Vec<RawConversation>,
        unit_errors: Vec<String>,
    }

    impl SourceParser for CannedParser {
        fn platform(&self) -> Platform {
            Platform::Augment
        }

        fn root_path(&self) -> Option<PathBuf> {
            None
        }

        fn is_installed(&self) -> bool {
            true
        }

        fn list_new_artifacts(&self, _cursor: &SourceCursor) -> Result<Vec<SourceArtifact>> {
            Ok(Vec::new())
        }

        fn parse(&self, _artifact: &SourceArtifact) -> Result<ParsedArtifact> {
            Ok(ParsedArtifact {
                conversations: self.conversations.clone(),
                unit_errors: self.unit_errors.clone(),
            })
        }
    }

    fn artifact() -> SourceArtifact {
        SourceArtifact {
            platform: Platform::Augment,
            path: PathBuf::from("/nonexistent/chunk.json"),
            marker: "chunk.json".to_string(),
            discovered_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn raw_conv(native_id: &str, contents: &[(&str, i64)]) -> RawConversation {
        RawConversation {
            platform: Platform::Augment,
            native_id: Some(native_id.to_string()),
            messages: contents
                .iter()
                .map(|(content, secs)| RawMessage {
                    native_id: None,
                    role: "assistant".to_string(),
                    content: content.to_string(),
                    timestamp: RawTimestamp::EpochMillis((1_700_000_000 + secs) * 1000),
                    seq: None,
                })
                .collect(),
            discovered_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_pipeline_commits_new_conversations() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        let parser = CannedParser {
            conversations: vec![raw_conv("c1", &[("we decided to use jsonl", 0)])],
            unit_errors: vec!["bad unit".to_string()],
        };

        let report = process_artifact(&parser, &artifact(), &store).unwrap();
        assert_eq!(report.conversations_new, 1);
        assert_eq!(report.messages_added, 1);
        assert_eq!(report.warnings, vec!["bad unit".to_string()]);
        assert!(report.wrote());

        let index = store.index().unwrap();
        assert_eq!(index.total_conversations, 1);
        assert_eq!(index.total_decisions, 1);
    }

    #[test]
    fn test_pipeline_rerun_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        let parser = CannedParser {
            conversations: vec![raw_conv("c1", &[("hello", 0)])],
            unit_errors: Vec::new(),
        };

        process_artifact(&parser, &artifact(), &store).unwrap();
        let report = process_artifact(&parser, &artifact(), &store).unwrap();

        assert!(!report.wrote());
        assert_eq!(store.index().unwrap().total_conversations, 1);
    }

    #[test]
    fn test_pipeline_merges_extended_conversation() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        let first = CannedParser {
            conversations: vec![raw_conv("c1", &[("we decided to use jsonl", 0)])],
            unit_errors: Vec::new(),
        };
        process_artifact(&first, &artifact(), &store).unwrap();

        let second = CannedParser {
            conversations: vec![raw_conv(
                "c1",
                &[
                    ("we decided to use jsonl", 0),
                    ("and decided to compact on migration", 10),
                ],
            )],
            unit_errors: Vec::new(),
        };
        let report = process_artifact(&second, &artifact(), &store).unwrap();

        assert_eq!(report.conversations_merged, 1);
        assert_eq!(report.messages_added, 1);

        let view = store.snapshot().unwrap();
        let record = view.records().next().unwrap();
        assert_eq!(record.message_count, 2);
        assert_eq!(record.decision_count, 2);
    }
}
