//! Warp SQLite parser
//!
//! Parses conversation rows from Warp's local database at
//! `~/.warp/warp.sqlite`, table `ai_messages`:
//!
//! ```text
//! ai_messages(id INTEGER PRIMARY KEY, conversation_id TEXT,
//!             role TEXT, message TEXT, sent_at TEXT)
//! ```
//!
//! One artifact is a row span `(last committed rowid, current max rowid]`;
//! the cursor marker records the span so re-listing with the same cursor is
//! idempotent and committed rows are never re-read. The database is opened
//! read-only and never cleaned up: Warp owns it.
//!
//! # Error Handling
//!
//! - **Unreadable database**: `Err`, the scan skips the artifact and retries
//!   next scan.
//! - **Rows with NULL message text**: recorded in
//!   [`ParsedArtifact::unit_errors`], remaining rows still parse.
//! - **Unparseable `sent_at` strings**: passed through as
//!   [`RawTimestamp::Text`]; the normalizer decides on the fallback.

use crate::error::{Error, Result};
use crate::sources::{
    ParsedArtifact, RawConversation, RawMessage, RawTimestamp, SourceArtifact, SourceParser,
};
use crate::types::{Platform, SourceCursor};
use chrono::Utc;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parser for Warp's SQLite conversation store.
pub struct WarpParser {
    root: Option<PathBuf>,
}

impl WarpParser {
    /// Create a new parser with the default root path (~/.warp).
    pub fn new() -> Self {
        Self {
            root: dirs::home_dir().map(|h| h.join(".warp")),
        }
    }

    /// Create a parser with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn database_path(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join("warp.sqlite"))
    }

    fn open_read_only(&self, path: &PathBuf) -> Result<Connection> {
        Ok(Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }
}

impl Default for WarpParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a row span as an artifact/cursor marker.
fn span_marker(lo: i64, hi: i64) -> String {
    format!("rows:{}:{}", lo, hi)
}

/// Decode a marker back into `(lo, hi]`. Unknown markers mean "from the start".
fn parse_marker(marker: &str) -> (i64, i64) {
    let mut parts = marker.splitn(3, ':');
    if parts.next() != Some("rows") {
        return (0, i64::MAX);
    }
    let lo = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let hi = parts
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(i64::MAX);
    (lo, hi)
}

impl SourceParser for WarpParser {
    fn platform(&self) -> Platform {
        Platform::Warp
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn is_installed(&self) -> bool {
        self.database_path().map(|p| p.exists()).unwrap_or(false)
    }

    fn list_new_artifacts(&self, cursor: &SourceCursor) -> Result<Vec<SourceArtifact>> {
        let db_path = match self.database_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(vec![]),
        };

        let conn = self.open_read_only(&db_path)?;
        let max_rowid: i64 =
            conn.query_row("SELECT COALESCE(MAX(id), 0) FROM ai_messages", [], |row| {
                row.get(0)
            })?;

        let committed = cursor
            .last_seen_marker
            .as_deref()
            .map(|m| parse_marker(m).1)
            .unwrap_or(0);

        if max_rowid <= committed {
            return Ok(vec![]);
        }

        Ok(vec![SourceArtifact {
            platform: Platform::Warp,
            path: db_path,
            marker: span_marker(committed, max_rowid),
            discovered_at: Utc::now(),
        }])
    }

    fn parse(&self, artifact: &SourceArtifact) -> Result<ParsedArtifact> {
        let (lo, hi) = parse_marker(&artifact.marker);
        let conn = self.open_read_only(&artifact.path)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, role, message, sent_at
                 FROM ai_messages
                 WHERE id > ?1 AND id <= ?2
                 ORDER BY id ASC",
            )
            .map_err(|e| Error::Parse {
                platform: self.platform().to_string(),
                artifact: artifact.reference(),
                reason: format!("unexpected schema: {}", e),
            })?;

        let rows = stmt.query_map(rusqlite::params![lo, hi], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut result = ParsedArtifact::default();
        // Group rows by conversation, preserving rowid order within each
        let mut grouped: BTreeMap<String, Vec<RawMessage>> = BTreeMap::new();

        for row in rows {
            let (rowid, conversation_id, role, message, sent_at) = row?;

            let content = match message {
                Some(m) if !m.is_empty() => m,
                _ => {
                    result
                        .unit_errors
                        .push(format!("{}: row {}: empty message", artifact.reference(), rowid));
                    continue;
                }
            };

            grouped
                .entry(conversation_id)
                .or_default()
                .push(RawMessage {
                    native_id: Some(format!("row-{}", rowid)),
                    role: role.unwrap_or_else(|| "user".to_string()),
                    content,
                    timestamp: sent_at.map(RawTimestamp::Text).unwrap_or_default(),
                    seq: Some(rowid),
                });
        }

        for (native_id, messages) in grouped {
            result.conversations.push(RawConversation {
                platform: Platform::Warp,
                native_id: Some(native_id),
                messages,
                discovered_at: artifact.discovered_at,
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_db(root: &std::path::Path, rows: &[(&str, &str, &str, &str)]) {
        std::fs::create_dir_all(root).unwrap();
        let conn = Connection::open(root.join("warp.sqlite")).unwrap();
        conn.execute_batch(
            "CREATE TABLE ai_messages (
                id INTEGER PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT,
                message TEXT,
                sent_at TEXT
            );",
        )
        .unwrap();
        for (conv, role, msg, sent) in rows {
            conn.execute(
                "INSERT INTO ai_messages (conversation_id, role, message, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![conv, role, msg, sent],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_marker_round_trip() {
        assert_eq!(parse_marker(&span_marker(3, 17)), (3, 17));
        assert_eq!(parse_marker("garbage"), (0, i64::MAX));
    }

    #[test]
    fn test_list_respects_cursor() {
        let tmp = TempDir::new().unwrap();
        seed_db(
            tmp.path(),
            &[
                ("c1", "user", "hello", "2024-01-01T10:00:00Z"),
                ("c1", "assistant", "hi", "2024-01-01T10:00:05Z"),
            ],
        );

        let parser = WarpParser::with_root(tmp.path().to_path_buf());

        let artifacts = parser.list_new_artifacts(&SourceCursor::default()).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].marker, "rows:0:2");

        // Cursor at the max rowid: nothing new
        let cursor = SourceCursor {
            last_scan_at: Some(Utc::now()),
            last_seen_marker: Some("rows:0:2".to_string()),
        };
        assert!(parser.list_new_artifacts(&cursor).unwrap().is_empty());
    }

    #[test]
    fn test_parse_groups_by_conversation() {
        let tmp = TempDir::new().unwrap();
        seed_db(
            tmp.path(),
            &[
                ("c1", "user", "first", "2024-01-01T10:00:00Z"),
                ("c2", "user", "other", "2024-01-01T11:00:00Z"),
                ("c1", "assistant", "reply", "2024-01-01T10:00:05Z"),
            ],
        );

        let parser = WarpParser::with_root(tmp.path().to_path_buf());
        let artifacts = parser.list_new_artifacts(&SourceCursor::default()).unwrap();
        let parsed = parser.parse(&artifacts[0]).unwrap();

        assert_eq!(parsed.conversations.len(), 2);
        let c1 = parsed
            .conversations
            .iter()
            .find(|c| c.native_id.as_deref() == Some("c1"))
            .unwrap();
        assert_eq!(c1.messages.len(), 2);
        assert_eq!(c1.messages[0].seq, Some(1));
        assert_eq!(c1.messages[1].seq, Some(3));
    }

    #[test]
    fn test_empty_message_rows_are_unit_errors() {
        let tmp = TempDir::new().unwrap();
        seed_db(
            tmp.path(),
            &[
                ("c1", "user", "", "2024-01-01T10:00:00Z"),
                ("c1", "assistant", "ok", "2024-01-01T10:00:05Z"),
            ],
        );

        let parser = WarpParser::with_root(tmp.path().to_path_buf());
        let artifacts = parser.list_new_artifacts(&SourceCursor::default()).unwrap();
        let parsed = parser.parse(&artifacts[0]).unwrap();

        assert_eq!(parsed.unit_errors.len(), 1);
        assert_eq!(parsed.conversations[0].messages.len(), 1);
    }
}
