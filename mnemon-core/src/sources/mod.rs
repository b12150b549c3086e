//! Source layer for discovering and parsing platform artifacts
//!
//! Each supported platform stores conversational records in its own on-disk
//! format (JSON chunk files, SQLite databases, JSONL transcripts). This module
//! defines the uniform contract the consolidation pipeline consumes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │  Platform stores │ ──► │ SourceParser │ ──► │ RawConversation  │
//! │ (~/.augment ...) │     │  (per impl)  │     │ (pre-normalized) │
//! └──────────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Purity**: a parser is a pure function of its input bytes and never
//!    mutates the source artifact; cleanup is a separate, explicit call.
//! 2. **Resilience**: a malformed unit yields a recorded error and parsing
//!    continues; one bad chunk must not block the rest of the batch.
//! 3. **Incremental**: `list_new_artifacts` honors the platform's
//!    [`SourceCursor`] so liberal polling stays cheap.
//! 4. **Extensible**: new platforms only require implementing [`SourceParser`].

pub mod augment;
pub mod claude;
pub mod cursor_export;
pub mod warp;

pub use augment::AugmentParser;
pub use claude::ClaudeCodeParser;
pub use cursor_export::CursorExportParser;
pub use warp::WarpParser;

use crate::config::Config;
use crate::error::Result;
use crate::types::{Platform, SourceCursor};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// One discrete unit of source data awaiting the pipeline.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    /// Platform the artifact belongs to
    pub platform: Platform,
    /// Path to the file or database the artifact lives in
    pub path: PathBuf,
    /// Parser-specific marker; becomes the cursor's `last_seen_marker` once
    /// the artifact is fully committed
    pub marker: String,
    /// When the scheduler discovered the artifact. Used as the timestamp
    /// fallback when a record carries none.
    pub discovered_at: DateTime<Utc>,
}

impl SourceArtifact {
    /// Short reference for outcomes and logs.
    pub fn reference(&self) -> String {
        self.path.display().to_string()
    }
}

/// Platform-native timestamp representation, resolved by the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawTimestamp {
    /// Milliseconds since the Unix epoch
    EpochMillis(i64),
    /// Seconds since the Unix epoch
    EpochSeconds(i64),
    /// A textual timestamp (RFC 3339 or a platform-local format)
    Text(String),
    /// The source carried no timestamp
    #[default]
    Missing,
}

/// A message as the platform recorded it, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    /// Platform-native message id, if one exists
    pub native_id: Option<String>,
    /// Platform-native role string ("user", "ai", ...)
    pub role: String,
    /// Content exactly as stored, encodings intact
    pub content: String,
    /// Timestamp as stored
    pub timestamp: RawTimestamp,
    /// Position within the conversation, if the platform records one
    pub seq: Option<i64>,
}

/// A conversation as parsed from one artifact, before normalization.
#[derive(Debug, Clone)]
pub struct RawConversation {
    /// Platform of origin
    pub platform: Platform,
    /// Platform-native conversation id, if one exists
    pub native_id: Option<String>,
    /// Messages in source order
    pub messages: Vec<RawMessage>,
    /// Discovery time of the containing artifact
    pub discovered_at: DateTime<Utc>,
}

/// Result of parsing one artifact.
///
/// Unit-level failures land in `unit_errors` so the surviving conversations
/// still flow through the pipeline.
#[derive(Debug, Default)]
pub struct ParsedArtifact {
    /// Conversations extracted from the artifact
    pub conversations: Vec<RawConversation>,
    /// Per-unit parse failures, reported in the scan outcome
    pub unit_errors: Vec<String>,
}

/// Trait implemented by all platform source parsers.
///
/// The parser owns the knowledge of where its platform stores data and how to
/// decode it; everything downstream sees only [`RawConversation`] values.
pub trait SourceParser: Send + Sync {
    /// Which platform this parser handles
    fn platform(&self) -> Platform;

    /// Root directory (or database file) for this platform's data
    ///
    /// Returns `None` if the path cannot be determined (e.g., $HOME not set).
    fn root_path(&self) -> Option<PathBuf>;

    /// Check if this platform is installed (root path exists)
    fn is_installed(&self) -> bool {
        self.root_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Import-only parsers have no pollable source; they are driven solely
    /// through explicit imports.
    fn import_only(&self) -> bool {
        false
    }

    /// List artifacts not yet covered by the cursor, oldest first.
    ///
    /// Must be read-only and idempotent: calling it twice with the same
    /// cursor returns the same artifacts.
    fn list_new_artifacts(&self, cursor: &SourceCursor) -> Result<Vec<SourceArtifact>>;

    /// Parse one artifact into raw conversations.
    ///
    /// Pure over the artifact's bytes: the same input produces the same
    /// output, and the source is never modified. Only a wholly unreadable
    /// artifact returns `Err`; malformed units inside it become
    /// [`ParsedArtifact::unit_errors`].
    fn parse(&self, artifact: &SourceArtifact) -> Result<ParsedArtifact>;

    /// Post-success cleanup of a transient artifact.
    ///
    /// Invoked by the scheduler only after the artifact's commit has fully
    /// succeeded. Default is a no-op; platforms with durable sources keep it
    /// that way.
    fn cleanup(&self, _artifact: &SourceArtifact) -> Result<()> {
        Ok(())
    }
}

/// Create the default parser set, honoring config path overrides.
pub fn create_all_parsers(config: &Config) -> Vec<Box<dyn SourceParser>> {
    let root = |p: Platform| config.platform(p).path;
    vec![
        Box::new(match root(Platform::Augment) {
            Some(r) => AugmentParser::with_root(r),
            None => AugmentParser::new(),
        }),
        Box::new(match root(Platform::Warp) {
            Some(r) => WarpParser::with_root(r),
            None => WarpParser::new(),
        }),
        Box::new(match root(Platform::ClaudeCode) {
            Some(r) => ClaudeCodeParser::with_root(r),
            None => ClaudeCodeParser::new(),
        }),
        Box::new(CursorExportParser::new()),
    ]
}
