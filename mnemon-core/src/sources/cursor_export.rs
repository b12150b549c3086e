//! Cursor export-file parser (manual import)
//!
//! Cursor has no pollable local store this engine reads; instead a human
//! exports conversations to a JSON file and imports it explicitly:
//!
//! ```text
//! {"conversations": [{"id": "...", "messages":
//!   [{"role": "user", "text": "...", "sentAtMs": 1700000000000}]}]}
//! ```
//!
//! The parser is import-only: it never lists artifacts, and the exported
//! file belongs to the human, so cleanup stays a no-op.

use crate::error::{Error, Result};
use crate::sources::{
    ParsedArtifact, RawConversation, RawMessage, RawTimestamp, SourceArtifact, SourceParser,
};
use crate::types::{Platform, SourceCursor};
use serde::Deserialize;
use std::path::PathBuf;

/// Parser for manually exported Cursor conversation files.
pub struct CursorExportParser;

impl CursorExportParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CursorExportParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawExport {
    conversations: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawExportConversation {
    id: Option<String>,
    messages: Vec<RawExportMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawExportMessage {
    id: Option<String>,
    role: Option<String>,
    text: Option<String>,
    sent_at_ms: Option<i64>,
}

impl SourceParser for CursorExportParser {
    fn platform(&self) -> Platform {
        Platform::CursorExport
    }

    fn root_path(&self) -> Option<PathBuf> {
        // No ambient install; artifacts arrive only through explicit import
        None
    }

    fn is_installed(&self) -> bool {
        true
    }

    fn import_only(&self) -> bool {
        true
    }

    fn list_new_artifacts(&self, _cursor: &SourceCursor) -> Result<Vec<SourceArtifact>> {
        Ok(vec![])
    }

    fn parse(&self, artifact: &SourceArtifact) -> Result<ParsedArtifact> {
        let content = std::fs::read_to_string(&artifact.path)?;

        let export: RawExport = serde_json::from_str(&content).map_err(|e| Error::Parse {
            platform: self.platform().to_string(),
            artifact: artifact.reference(),
            reason: format!("malformed export JSON: {}", e),
        })?;

        let mut result = ParsedArtifact::default();

        for (i, value) in export.conversations.iter().enumerate() {
            let conv: RawExportConversation = match serde_json::from_value(value.clone()) {
                Ok(c) => c,
                Err(e) => {
                    result.unit_errors.push(format!(
                        "{}: conversation {}: {}",
                        artifact.reference(),
                        i,
                        e
                    ));
                    continue;
                }
            };

            let messages: Vec<RawMessage> = conv
                .messages
                .into_iter()
                .enumerate()
                .filter_map(|(seq, m)| {
                    let text = m.text.filter(|t| !t.is_empty())?;
                    Some(RawMessage {
                        native_id: m.id,
                        role: m.role.unwrap_or_else(|| "user".to_string()),
                        content: text,
                        timestamp: m
                            .sent_at_ms
                            .map(RawTimestamp::EpochMillis)
                            .unwrap_or_default(),
                        seq: Some(seq as i64),
                    })
                })
                .collect();

            if !messages.is_empty() {
                result.conversations.push(RawConversation {
                    platform: Platform::CursorExport,
                    native_id: conv.id,
                    messages,
                    discovered_at: artifact.discovered_at,
                });
            }
        }

        Ok(result)
    }
}
