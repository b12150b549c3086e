//! Normalizer: raw platform records into the canonical model
//!
//! Normalization is total: no malformed timestamp or content aborts it.
//! Unparseable timestamps fall back to the artifact's discovery time, and
//! the substitution is flagged on the conversation so fact extraction can
//! down-weight it.

use crate::sources::{RawConversation, RawTimestamp};
use crate::types::{Conversation, Message, Role};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Collapse platform-specific content encodings into plain text.
///
/// Handles the escaped pipe delimiters Augment chunks use, CRLF line
/// endings, and embedded control characters (newline and tab survive).
pub fn clean_text(content: &str) -> String {
    let unescaped = content.replace("\\|", "|").replace("\r\n", "\n");
    unescaped
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Resolve a platform-native timestamp to an absolute instant.
///
/// Returns `None` when the representation is missing or unparseable; the
/// caller substitutes the discovery time and flags the conversation.
pub fn resolve_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms),
        RawTimestamp::EpochSeconds(s) => DateTime::from_timestamp(*s, 0),
        RawTimestamp::Text(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            // Platform-local format without zone designator, assumed UTC
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        }
        RawTimestamp::Missing => None,
    }
}

/// Normalize one raw conversation into the canonical model.
///
/// Assigns stable ids, orders messages by timestamp (ties broken by the
/// platform-assigned sequence, else insertion order), and records whether any
/// timestamp had to be substituted.
pub fn normalize(raw: RawConversation) -> Conversation {
    let discovered_at = raw.discovered_at;
    let platform = raw.platform;

    let first_content = raw
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or("");
    let conversation_id =
        Conversation::derive_id(platform, raw.native_id.as_deref(), first_content);

    let mut timestamp_substituted = false;
    let mut ordered: Vec<(DateTime<Utc>, i64, usize, Message)> = Vec::new();

    for (insertion, raw_msg) in raw.messages.into_iter().enumerate() {
        let content = clean_text(&raw_msg.content);
        if content.is_empty() {
            continue;
        }

        let ts = match resolve_timestamp(&raw_msg.timestamp) {
            Some(ts) => ts,
            None => {
                timestamp_substituted = true;
                discovered_at
            }
        };

        let message = Message {
            id: Message::derive_id(platform, raw_msg.native_id.as_deref(), &content, ts),
            conversation_id: conversation_id.clone(),
            role: Role::from_native(&raw_msg.role),
            content,
            ts,
            platform,
            seq: raw_msg.seq,
        };

        ordered.push((ts, raw_msg.seq.unwrap_or(insertion as i64), insertion, message));
    }

    ordered.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
    let messages: Vec<Message> = ordered.into_iter().map(|(_, _, _, m)| m).collect();

    let started_at = messages.first().map(|m| m.ts).unwrap_or(discovered_at);
    let ended_at = messages.last().map(|m| m.ts).unwrap_or(discovered_at);

    Conversation {
        id: conversation_id,
        platform,
        messages,
        started_at,
        ended_at,
        timestamp_substituted,
    }
}
