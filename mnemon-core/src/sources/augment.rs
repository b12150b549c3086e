//! Augment JSON chunk parser
//!
//! Parses transient cache chunks from `~/.augment/cache/chunks/*.json`.
//! Each chunk file holds one conversation slice the extension flushed to
//! disk, including teleported content pulled down from the cloud side.
//!
//! Chunks are transient by contract: once a chunk's pipeline has fully
//! committed, [`SourceParser::cleanup`] deletes the file. Failed chunks stay
//! on disk and are retried on the next scan.
//!
//! # Error Handling
//!
//! - **Malformed chunk JSON**: the whole chunk is one unit; the failure is
//!   reported via `Err` so the scheduler skips the artifact and moves on.
//! - **Malformed exchanges inside a valid chunk**: recorded in
//!   [`ParsedArtifact::unit_errors`], remaining exchanges still parse.
//! - **Missing timestamps**: left as [`RawTimestamp::Missing`]; the
//!   normalizer substitutes the discovery time and flags the conversation.

use crate::error::{Error, Result};
use crate::sources::{
    ParsedArtifact, RawConversation, RawMessage, RawTimestamp, SourceArtifact, SourceParser,
};
use crate::types::{Platform, SourceCursor};
use chrono::Utc;
use serde::Deserialize;
use std::path::PathBuf;

/// Parser for Augment's transient JSON chunk cache.
pub struct AugmentParser {
    root: Option<PathBuf>,
}

impl AugmentParser {
    /// Create a new parser with the default root path (~/.augment).
    pub fn new() -> Self {
        Self {
            root: dirs::home_dir().map(|h| h.join(".augment")),
        }
    }

    /// Create a parser with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }
}

impl Default for AugmentParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw chunk types (serde deserialization)
// ============================================

/// One cache chunk file.
///
/// Uses `#[serde(default)]` liberally to handle missing fields gracefully.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawChunk {
    conversation_id: Option<String>,
    exchanges: Vec<serde_json::Value>,
    /// Set when the chunk arrived via teleportation rather than local activity
    teleported: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawExchange {
    id: Option<String>,
    role: Option<String>,
    text: Option<String>,
    timestamp_ms: Option<i64>,
    seq: Option<i64>,
}

impl SourceParser for AugmentParser {
    fn platform(&self) -> Platform {
        Platform::Augment
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn list_new_artifacts(&self, _cursor: &SourceCursor) -> Result<Vec<SourceArtifact>> {
        let root = match self.root_path() {
            Some(r) => r,
            None => return Ok(vec![]),
        };

        // Chunks are deleted after successful processing, so every file still
        // present is pending: either new or a retry of an earlier failure.
        let pattern = root.join("cache/chunks/*.json");
        let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| Error::Parse {
            platform: self.platform().to_string(),
            artifact: pattern.display().to_string(),
            reason: format!("invalid glob pattern: {}", e),
        })?;

        let mut artifacts: Vec<SourceArtifact> = entries
            .flatten()
            .map(|path| {
                let marker = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                SourceArtifact {
                    platform: Platform::Augment,
                    path,
                    marker,
                    discovered_at: Utc::now(),
                }
            })
            .collect();

        // Oldest pending first: mtime order, name as tie-break
        artifacts.sort_by_key(|a| {
            let mtime = std::fs::metadata(&a.path)
                .and_then(|m| m.modified())
                .ok();
            (mtime, a.marker.clone())
        });

        Ok(artifacts)
    }

    fn parse(&self, artifact: &SourceArtifact) -> Result<ParsedArtifact> {
        let content = std::fs::read_to_string(&artifact.path)?;

        let chunk: RawChunk = serde_json::from_str(&content).map_err(|e| Error::Parse {
            platform: self.platform().to_string(),
            artifact: artifact.reference(),
            reason: format!("malformed chunk JSON: {}", e),
        })?;

        let mut result = ParsedArtifact::default();
        let mut messages = Vec::new();

        for (i, value) in chunk.exchanges.iter().enumerate() {
            let exchange: RawExchange = match serde_json::from_value(value.clone()) {
                Ok(e) => e,
                Err(e) => {
                    result
                        .unit_errors
                        .push(format!("{}: exchange {}: {}", artifact.reference(), i, e));
                    continue;
                }
            };

            let text = match exchange.text {
                Some(t) if !t.is_empty() => t,
                _ => {
                    result.unit_errors.push(format!(
                        "{}: exchange {}: missing text",
                        artifact.reference(),
                        i
                    ));
                    continue;
                }
            };

            messages.push(RawMessage {
                native_id: exchange.id,
                role: exchange.role.unwrap_or_else(|| "user".to_string()),
                content: text,
                timestamp: exchange
                    .timestamp_ms
                    .map(RawTimestamp::EpochMillis)
                    .unwrap_or_default(),
                seq: exchange.seq.or(Some(i as i64)),
            });
        }

        if chunk.teleported.unwrap_or(false) {
            tracing::debug!(
                artifact = %artifact.reference(),
                "Chunk contains teleported content"
            );
        }

        if !messages.is_empty() {
            result.conversations.push(RawConversation {
                platform: Platform::Augment,
                native_id: chunk.conversation_id,
                messages,
                discovered_at: artifact.discovered_at,
            });
        }

        Ok(result)
    }

    fn cleanup(&self, artifact: &SourceArtifact) -> Result<()> {
        std::fs::remove_file(&artifact.path)?;
        tracing::debug!(
            artifact = %artifact.reference(),
            "Removed committed chunk"
        );
        Ok(())
    }
}
