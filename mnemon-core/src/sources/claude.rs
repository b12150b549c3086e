//! Claude Code JSONL transcript parser
//!
//! Parses transcripts from `~/.claude/projects/[encoded-path]/*.jsonl`, one
//! conversation per file, one record per line:
//!
//! ```text
//! {"uuid":"...","sessionId":"...","type":"user","message":{"role":"user",
//!  "content":"..."},"timestamp":"2024-01-01T10:00:00Z"}
//! ```
//!
//! Transcripts are append-only and owned by the client, so cleanup is a
//! no-op. Change detection is by file mtime against the cursor marker; a
//! touched file is re-parsed whole and deduplication keeps the re-read cheap.
//!
//! # Error Handling
//!
//! - **Malformed JSON lines**: recorded in [`ParsedArtifact::unit_errors`],
//!   line skipped, parsing continues.
//! - **Missing fields**: sensible defaults via `#[serde(default)]`; a missing
//!   timestamp is left for the normalizer to substitute and flag.
//! - **Non-message records** (summaries, context injection): skipped.

use crate::error::{Error, Result};
use crate::sources::{
    ParsedArtifact, RawConversation, RawMessage, RawTimestamp, SourceArtifact, SourceParser,
};
use crate::types::{Platform, SourceCursor};
use chrono::Utc;
use serde::Deserialize;
use std::io::BufRead;
use std::path::PathBuf;

/// Parser for Claude Code JSONL transcripts.
pub struct ClaudeCodeParser {
    root: Option<PathBuf>,
}

impl ClaudeCodeParser {
    /// Create a new parser with the default root path (~/.claude).
    pub fn new() -> Self {
        Self {
            root: dirs::home_dir().map(|h| h.join(".claude")),
        }
    }

    /// Create a parser with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }
}

impl Default for ClaudeCodeParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single line from a Claude Code transcript.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    uuid: Option<String>,
    session_id: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    message: Option<RawRecordMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecordMessage {
    role: Option<String>,
    content: Option<String>,
}

/// Marker encoding: mtime of the newest fully committed transcript, millis.
fn mtime_marker(millis: i64) -> String {
    format!("mtime:{}", millis)
}

fn parse_mtime_marker(marker: &str) -> i64 {
    marker
        .strip_prefix("mtime:")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn file_mtime_millis(path: &std::path::Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl SourceParser for ClaudeCodeParser {
    fn platform(&self) -> Platform {
        Platform::ClaudeCode
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn list_new_artifacts(&self, cursor: &SourceCursor) -> Result<Vec<SourceArtifact>> {
        let root = match self.root_path() {
            Some(r) => r,
            None => return Ok(vec![]),
        };

        let committed_mtime = cursor
            .last_seen_marker
            .as_deref()
            .map(parse_mtime_marker)
            .unwrap_or(0);

        let pattern = root.join("projects/*/*.jsonl");
        let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| Error::Parse {
            platform: self.platform().to_string(),
            artifact: pattern.display().to_string(),
            reason: format!("invalid glob pattern: {}", e),
        })?;

        let mut artifacts: Vec<SourceArtifact> = entries
            .flatten()
            .filter_map(|path| {
                let mtime = file_mtime_millis(&path);
                if mtime <= committed_mtime {
                    return None;
                }
                Some(SourceArtifact {
                    platform: Platform::ClaudeCode,
                    marker: mtime_marker(mtime),
                    path,
                    discovered_at: Utc::now(),
                })
            })
            .collect();

        // Oldest first so cursor advancement stays monotonic
        artifacts.sort_by_key(|a| (parse_mtime_marker(&a.marker), a.path.clone()));

        Ok(artifacts)
    }

    fn parse(&self, artifact: &SourceArtifact) -> Result<ParsedArtifact> {
        let file = std::fs::File::open(&artifact.path)?;
        let reader = std::io::BufReader::new(file);

        let mut result = ParsedArtifact::default();
        let mut messages = Vec::new();
        let mut session_id = None;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: RawRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    result.unit_errors.push(format!(
                        "{}: line {}: {}",
                        artifact.reference(),
                        line_no + 1,
                        e
                    ));
                    continue;
                }
            };

            // Only conversation records; summaries and context records are
            // not part of the canonical message stream
            let is_message = matches!(record.record_type.as_deref(), Some("user" | "assistant"));
            if !is_message {
                continue;
            }

            let Some(msg) = record.message else { continue };
            let content = match msg.content {
                Some(c) if !c.is_empty() => c,
                _ => continue,
            };

            if session_id.is_none() {
                session_id = record.session_id.clone();
            }

            messages.push(RawMessage {
                native_id: record.uuid,
                role: msg
                    .role
                    .or(record.record_type)
                    .unwrap_or_else(|| "user".to_string()),
                content,
                timestamp: record.timestamp.map(RawTimestamp::Text).unwrap_or_default(),
                seq: Some(line_no as i64),
            });
        }

        // File stem is the session id when the records carried none
        let native_id = session_id.or_else(|| {
            artifact
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        });

        if !messages.is_empty() {
            result.conversations.push(RawConversation {
                platform: Platform::ClaudeCode,
                native_id,
                messages,
                discovered_at: artifact.discovered_at,
            });
        }

        Ok(result)
    }
}
