//! Core domain types for mnemon
//!
//! These types form the canonical model that normalizes conversational
//! records from all supported AI assistant platforms before consolidation.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Platform** | An AI assistant client whose local data mnemon ingests |
//! | **Artifact** | One discrete unit of source data (chunk file, row set, transcript) |
//! | **Conversation** | A normalized, ordered sequence of Messages from one platform |
//! | **Consolidation** | Merging extracted conversation data into the store without duplication |
//! | **Tier** | Aging bucket controlling retained detail for a consolidated record |
//! | **Teleportation** | A user action that surfaces cloud-only content in a local platform store |
//!
//! ### Human vs User
//!
//! "User" is ambiguous across platform log formats, so mnemon types use
//! [`Role::Human`] for a real person and map platform-specific "user" roles
//! onto it during normalization.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

// ============================================
// Platforms
// ============================================

/// Supported AI assistant platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Editor extension storing transient JSON chunk files
    Augment,
    /// Terminal app storing conversations in a SQLite database
    Warp,
    /// CLI tool storing JSONL transcripts
    ClaudeCode,
    /// Manual one-shot import of an exported JSON file
    CursorExport,
}

impl Platform {
    /// All platforms known to the engine, in registration order.
    pub fn all() -> [Platform; 4] {
        [
            Platform::Augment,
            Platform::Warp,
            Platform::ClaudeCode,
            Platform::CursorExport,
        ]
    }

    /// Returns the display name for this platform
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Augment => "Augment",
            Platform::Warp => "Warp",
            Platform::ClaudeCode => "Claude Code",
            Platform::CursorExport => "Cursor Export",
        }
    }

    /// Returns the identifier used in store records and config keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Augment => "augment",
            Platform::Warp => "warp",
            Platform::ClaudeCode => "claude_code",
            Platform::CursorExport => "cursor_export",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "augment" => Ok(Platform::Augment),
            "warp" => Ok(Platform::Warp),
            "claude_code" | "claude" => Ok(Platform::ClaudeCode),
            "cursor_export" | "cursor" => Ok(Platform::CursorExport),
            _ => Err(format!("unknown platform: {}", s)),
        }
    }
}

// ============================================
// Messages
// ============================================

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Real person
    Human,
    /// The assistant
    Assistant,
    /// System messages, context injection
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Map a platform-native role string onto the canonical role.
    ///
    /// Unknown roles become [`Role::System`] rather than failing, so one odd
    /// record never aborts normalization.
    pub fn from_native(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "user" | "human" => Role::Human,
            "assistant" | "ai" | "model" => Role::Assistant,
            _ => Role::System,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Role::Human),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A normalized message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Deterministic id derived from (platform, native id | content hash, timestamp)
    pub id: String,
    /// Conversation this message belongs to
    pub conversation_id: String,
    /// Canonical author role
    pub role: Role,
    /// Cleaned plain-text content
    pub content: String,
    /// Absolute timestamp
    pub ts: DateTime<Utc>,
    /// Platform the message was ingested from
    pub platform: Platform,
    /// Platform-assigned sequence within the conversation, if the source had one
    pub seq: Option<i64>,
}

impl Message {
    /// Derive the stable message id.
    ///
    /// Repeated parsing of the same underlying record must yield the same id,
    /// which is what makes re-ingestion idempotent. When the source assigns
    /// no native id, a hash of the content stands in for it.
    pub fn derive_id(
        platform: Platform,
        native_id: Option<&str>,
        content: &str,
        ts: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(platform.as_str().as_bytes());
        hasher.update(b"\x1f");
        match native_id {
            Some(nid) => hasher.update(nid.as_bytes()),
            None => hasher.update(Sha256::digest(content.as_bytes())),
        }
        hasher.update(b"\x1f");
        hasher.update(ts.timestamp_millis().to_be_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

// ============================================
// Conversations
// ============================================

/// A normalized conversation: an ordered sequence of messages from one platform.
///
/// Owned by the normalizer until handed to the consolidator, which re-owns
/// its content as part of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Canonical conversation id
    pub id: String,
    /// Platform the conversation was ingested from
    pub platform: Platform,
    /// Messages ordered by timestamp (ties broken by native sequence)
    pub messages: Vec<Message>,
    /// Timestamp of the earliest message
    pub started_at: DateTime<Utc>,
    /// Timestamp of the latest message
    pub ended_at: DateTime<Utc>,
    /// True if any message timestamp was substituted with the artifact's
    /// discovery time. Extraction down-weights flagged conversations.
    pub timestamp_substituted: bool,
}

impl Conversation {
    /// Derive the stable conversation id.
    ///
    /// Keyed on the native conversation id alone when the platform provides
    /// one, so teleported content surfacing in two client stores converges on
    /// a single record. Id-less conversations fall back to platform + content
    /// hash of the opening message.
    pub fn derive_id(platform: Platform, native_id: Option<&str>, first_content: &str) -> String {
        let mut hasher = Sha256::new();
        match native_id {
            Some(nid) => {
                hasher.update(b"conv\x1f");
                hasher.update(nid.as_bytes());
            }
            None => {
                hasher.update(platform.as_str().as_bytes());
                hasher.update(b"\x1f");
                hasher.update(Sha256::digest(first_content.as_bytes()));
            }
        }
        hex::encode(&hasher.finalize()[..8])
    }

    /// Ids of all messages, in order.
    pub fn message_ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }
}

// ============================================
// Extracted Facts
// ============================================

/// Structured facts derived from a conversation's message content.
///
/// Derived and recomputable, never independently authoritative: always
/// regenerable from the conversation it was extracted from. Empty sets are a
/// valid result, not a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFacts {
    /// Conversation the facts were extracted from
    pub conversation_id: String,
    /// Decision statements detected in the text
    pub decisions: BTreeSet<String>,
    /// Action items detected in the text
    pub actions: BTreeSet<String>,
    /// Technical work markers (files touched, commands run)
    pub technical_work: BTreeSet<String>,
    /// Intent inferred from the opening human message
    pub intent: Option<String>,
    /// One-line summary of the conversation
    pub summary: String,
}

// ============================================
// Archive Tiers
// ============================================

/// Aging bucket for a consolidated record.
///
/// Detail policy: `recent` retains record + full conversation text, `medium`
/// retains record + summary, `old` retains the record only, `archive` folds
/// records into one roll-up line per calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveTier {
    /// 0-7 days
    Recent,
    /// 7-30 days
    Medium,
    /// 30-90 days
    Old,
    /// 90+ days, rolled up per calendar month
    Archive,
}

impl ArchiveTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveTier::Recent => "recent",
            ArchiveTier::Medium => "medium",
            ArchiveTier::Old => "old",
            ArchiveTier::Archive => "archive",
        }
    }

    /// The live tiers, i.e. those holding per-conversation records.
    pub fn live() -> [ArchiveTier; 3] {
        [ArchiveTier::Recent, ArchiveTier::Medium, ArchiveTier::Old]
    }

    /// Compute the tier for a record whose newest message is `last_activity`.
    pub fn for_age(now: DateTime<Utc>, last_activity: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(last_activity);
        if age < Duration::days(7) {
            ArchiveTier::Recent
        } else if age < Duration::days(30) {
            ArchiveTier::Medium
        } else if age < Duration::days(90) {
            ArchiveTier::Old
        } else {
            ArchiveTier::Archive
        }
    }
}

impl std::str::FromStr for ArchiveTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" => Ok(ArchiveTier::Recent),
            "medium" => Ok(ArchiveTier::Medium),
            "old" => Ok(ArchiveTier::Old),
            "archive" => Ok(ArchiveTier::Archive),
            _ => Err(format!("unknown tier: {}", s)),
        }
    }
}

// ============================================
// Consolidation Records
// ============================================

/// The durable, append-only unit written to the store. One per conversation.
///
/// `message_ids` is carried so the deduplicator can compare message sets even
/// after tier demotion has dropped the per-message text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationRecord {
    /// Conversation this record consolidates
    pub conversation_id: String,
    /// Timestamp of the newest merged message; drives tier aging
    pub ts: DateTime<Utc>,
    /// Platform that first produced the conversation
    pub platform: Platform,
    /// One-line summary; cleared on demotion to `old`
    pub summary: Option<String>,
    /// Count of detected decisions across the merged message set
    pub decision_count: u64,
    /// Count of detected action items across the merged message set
    pub action_count: u64,
    /// Count of detected technical-work markers
    pub technical_work_count: u64,
    /// Number of merged messages
    pub message_count: u64,
    /// Ids of all merged messages
    pub message_ids: Vec<String>,
    /// Current aging bucket
    pub tier: ArchiveTier,
}

// ============================================
// Archive Buckets
// ============================================

/// One rolled-up archive entry per calendar month.
///
/// Records entering the archive tier are folded in here and cease to exist as
/// standalone objects; only aggregate counts survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveBucket {
    /// Calendar period key, `YYYY-MM` of the records' last activity
    pub period: String,
    /// Conversations folded into this bucket
    pub conversation_count: u64,
    /// Summed decision counts
    pub decision_count: u64,
    /// Summed action counts
    pub action_count: u64,
    /// Per-platform conversation counts
    pub per_platform: BTreeMap<String, u64>,
    /// Last fold time
    pub updated_at: DateTime<Utc>,
}

impl ArchiveBucket {
    /// Period key for a record timestamp.
    pub fn period_for(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m").to_string()
    }

    pub fn empty(period: String) -> Self {
        Self {
            period,
            conversation_count: 0,
            decision_count: 0,
            action_count: 0,
            per_platform: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

// ============================================
// Aggregate Index
// ============================================

/// Materialized summary over all consolidation records and archive buckets.
///
/// Always a cache: it must equal a fold over the current record set plus
/// archive bucket metadata, never a second source of truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateIndex {
    /// Distinct conversations: live records plus archived bucket counts
    pub total_conversations: u64,
    /// Conversations represented only by archive buckets
    pub archived_conversations: u64,
    /// Summed decision counts over live records and buckets
    pub total_decisions: u64,
    /// Summed action counts over live records and buckets
    pub total_actions: u64,
    /// Per-platform conversation counts (live + archived)
    pub per_platform: BTreeMap<String, u64>,
    /// When the index was last recomputed
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================
// Source Cursors
// ============================================

/// The scheduler's per-platform bookmark.
///
/// Advanced only after an artifact's full pipeline, through the consolidator
/// commit, has succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCursor {
    /// When the platform was last scanned
    pub last_scan_at: Option<DateTime<Utc>>,
    /// Parser-specific marker of the last fully committed artifact
    pub last_seen_marker: Option<String>,
}

// ============================================
// Outcomes
// ============================================

/// Terminal state of a scan or import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// The scan ran to the end of its artifact list
    Completed,
    /// Config or the permission gate kept the platform from running
    Disabled,
    /// Cancellation stopped the scan partway; the cursor reflects only
    /// fully committed artifacts
    Cancelled,
}

/// One artifact failure within a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    /// Artifact reference (path or marker)
    pub artifact: String,
    /// First line of the failure reason
    pub reason: String,
    /// Consecutive scans this artifact has failed, including this one.
    /// Streaks above 1 mean a persistent problem worth human attention.
    pub streak: u32,
}

/// Structured outcome of one platform scan or import.
///
/// A scan always reports counts, never a silent no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Platform scanned
    pub platform: Platform,
    /// Terminal state
    pub status: ScanStatus,
    /// Artifacts fully processed and committed
    pub processed: usize,
    /// Artifacts skipped (no new content after deduplication)
    pub skipped: usize,
    /// Artifacts that failed and were left for the next scan
    pub failed: usize,
    /// New consolidation records created
    pub conversations_new: usize,
    /// Existing records merged with new messages
    pub conversations_merged: usize,
    /// Messages added to the store
    pub messages_added: usize,
    /// Failure details, capped to the first few per scan
    pub failures: Vec<ScanFailure>,
    /// Non-fatal warnings (malformed units, substituted timestamps)
    pub warnings: Vec<String>,
}

impl ScanOutcome {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            status: ScanStatus::Completed,
            processed: 0,
            skipped: 0,
            failed: 0,
            conversations_new: 0,
            conversations_merged: 0,
            messages_added: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn disabled(platform: Platform) -> Self {
        Self {
            status: ScanStatus::Disabled,
            ..Self::new(platform)
        }
    }
}

/// Structured outcome of a tier migration pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationOutcome {
    /// Records demoted from recent to medium
    pub demoted_to_medium: usize,
    /// Records demoted from medium to old
    pub demoted_to_old: usize,
    /// Records folded into archive buckets
    pub archived: usize,
}

impl MigrationOutcome {
    /// Total records moved in this pass.
    pub fn total_moved(&self) -> usize {
        self.demoted_to_medium + self.demoted_to_old + self.archived
    }
}
