//! Fact extractor: rule-based enrichment over message content
//!
//! Pattern matching over the conversation text detects decision phrasing,
//! action phrasing, and technical-work markers, and derives an intent line
//! and a one-line summary. Extraction is deterministic for identical input
//! and never fails; no detectable facts means empty sets, not an error.
//!
//! Conversations flagged with substituted timestamps are down-weighted:
//! their text still yields technical-work markers and a summary, but no
//! decisions or actions, since the record's placement in time is suspect.

use crate::types::{Conversation, ExtractedFacts, Role};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const MAX_FACT_LEN: usize = 160;
const MAX_INTENT_LEN: usize = 120;

fn decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(decided to|decision:|we(?:'ll| will) (?:use|go with)|going with|settled on|opted for|agreed (?:to|on)|chose)\b",
        )
        .expect("decision pattern compiles")
    })
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(todo:?|need(?:s)? to|next step|action item|will implement|should (?:add|fix|update|refactor|write)|must (?:add|fix|update))\b",
        )
        .expect("action pattern compiles")
    })
}

fn technical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:[\w./-]+\.(?:rs|py|js|ts|tsx|go|java|c|h|cpp|toml|yaml|yml|json|sql|md)\b)|(?m:^\s*(?:\$|cargo |git |npm |pip |make\b))",
        )
        .expect("technical pattern compiles")
    })
}

/// Truncate a matched sentence to a stable, bounded fact string.
fn clip(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let clipped: String = trimmed.chars().take(max).collect();
    format!("{}...", clipped.trim_end())
}

/// Split content into rough sentences for fact attribution.
fn sentences(content: &str) -> impl Iterator<Item = &str> {
    content
        .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Collect the sentences of `content` matched by `re` into `out`.
fn collect_matches(re: &Regex, content: &str, out: &mut BTreeSet<String>) {
    for sentence in sentences(content) {
        if re.is_match(sentence) {
            out.insert(clip(sentence, MAX_FACT_LEN));
        }
    }
}

/// Derive structured facts from a conversation.
pub fn extract(conversation: &Conversation) -> ExtractedFacts {
    let mut decisions = BTreeSet::new();
    let mut actions = BTreeSet::new();
    let mut technical_work = BTreeSet::new();

    let down_weighted = conversation.timestamp_substituted;

    for message in &conversation.messages {
        if message.role == Role::System {
            continue;
        }

        if !down_weighted {
            collect_matches(decision_re(), &message.content, &mut decisions);
            collect_matches(action_re(), &message.content, &mut actions);
        }

        for m in technical_re().find_iter(&message.content) {
            technical_work.insert(clip(m.as_str(), MAX_FACT_LEN));
        }
    }

    let intent = conversation
        .messages
        .iter()
        .find(|m| m.role == Role::Human)
        .and_then(|m| m.content.lines().next())
        .map(|line| clip(line, MAX_INTENT_LEN));

    let summary = format!(
        "{} ({} messages, {} decisions, {} actions)",
        intent.as_deref().unwrap_or("Conversation"),
        conversation.messages.len(),
        decisions.len(),
        actions.len()
    );

    ExtractedFacts {
        conversation_id: conversation.id.clone(),
        decisions,
        actions,
        technical_work,
        intent,
        summary,
    }
}
