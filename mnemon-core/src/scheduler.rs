//! Scheduler: per-platform polling tasks and the automation surface
//!
//! Each enabled, pollable platform gets its own timer task, so a platform
//! with a large backlog or a persistent failure never blocks the others.
//! Cursor advancement is strictly commit-first: an artifact's marker is
//! recorded only after its pipeline run and cleanup have both succeeded, so
//! a crash at any point replays work the deduplicator then discards.
//!
//! Cancellation is honored between artifacts: the current artifact finishes
//! its commit, the scan reports `Cancelled`, and the cursor reflects only
//! fully committed work.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{self, PipelineReport};
use crate::sources::{self, SourceArtifact, SourceParser};
use crate::store::{Store, StoreStats};
use crate::types::{MigrationOutcome, Platform, ScanFailure, ScanOutcome, ScanStatus, SourceCursor};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Failure details kept per scan outcome; the `failed` count is still exact.
const MAX_REPORTED_FAILURES: usize = 5;

/// Decides whether the engine may read a platform's store at all.
///
/// The host environment supplies the real implementation; a denied platform
/// reports `Disabled` rather than silently vanishing.
pub trait PermissionGate: Send + Sync {
    fn granted(&self, platform: Platform) -> bool;
}

/// Default gate: every platform is readable.
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn granted(&self, _platform: Platform) -> bool {
        true
    }
}

/// Durable scheduler state: cursors and failure streaks.
///
/// Lives beside the store so an engine restart resumes where it left off.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SchedulerState {
    /// Per-platform cursors, keyed by platform id
    #[serde(default)]
    cursors: BTreeMap<String, SourceCursor>,
    /// Consecutive failure counts, keyed by artifact reference
    #[serde(default)]
    failure_streaks: BTreeMap<String, u32>,
}

/// Current engine view for the status surface.
#[derive(Debug)]
pub struct EngineStatus {
    pub store: StoreStats,
    pub platforms: Vec<PlatformStatus>,
}

/// One platform's scheduling state.
#[derive(Debug)]
pub struct PlatformStatus {
    pub platform: Platform,
    pub enabled: bool,
    pub installed: bool,
    pub import_only: bool,
    pub cursor: SourceCursor,
    /// Artifacts currently on a failure streak
    pub failing_artifacts: usize,
}

/// The consolidation engine's scheduler.
pub struct Scheduler {
    store: Arc<Store>,
    config: Config,
    parsers: Vec<Arc<dyn SourceParser>>,
    gate: Arc<dyn PermissionGate>,
    state: Mutex<SchedulerState>,
    state_path: PathBuf,
}

impl Scheduler {
    /// Build a scheduler over the given store, with the default parser set
    /// and an allow-all permission gate.
    pub fn new(config: Config, store: Arc<Store>) -> Result<Self> {
        let parsers = sources::create_all_parsers(&config)
            .into_iter()
            .map(Arc::from)
            .collect();
        Self::with_parsers(config, store, parsers, Arc::new(AllowAll))
    }

    /// Build a scheduler with explicit parsers and permission gate.
    pub fn with_parsers(
        config: Config,
        store: Arc<Store>,
        parsers: Vec<Arc<dyn SourceParser>>,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<Self> {
        let state_path = store.root().join("state").join("cursors.json");
        let state = load_state(&state_path)?;
        Ok(Self {
            store,
            config,
            parsers,
            gate,
            state: Mutex::new(state),
            state_path,
        })
    }

    /// Spawn one polling task per enabled, pollable platform.
    ///
    /// Tasks run until the token is cancelled; a scan failure on one platform
    /// is logged and retried on its next tick, never propagated to siblings.
    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for parser in &self.parsers {
            let platform = parser.platform();
            let settings = self.config.platform(platform);
            if !settings.enabled || settings.import_only || parser.import_only() {
                tracing::debug!(platform = %platform, "Not scheduling");
                continue;
            }

            let scheduler = Arc::clone(self);
            let parser = Arc::clone(parser);
            let cancel = cancel.clone();
            let period = Duration::from_millis(settings.poll_interval_ms.max(1));

            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match scheduler.scan_parser(Arc::clone(&parser), &cancel).await {
                                Ok(outcome) => tracing::info!(
                                    platform = %platform,
                                    processed = outcome.processed,
                                    skipped = outcome.skipped,
                                    failed = outcome.failed,
                                    "Scan complete"
                                ),
                                Err(e) => tracing::error!(
                                    platform = %platform,
                                    error = %e,
                                    "Scan failed, will retry next tick"
                                ),
                            }
                        }
                    }
                }
                tracing::debug!(platform = %platform, "Polling task stopped");
            }));
        }

        handles
    }

    /// Run one scan for a platform, immediately.
    pub async fn run_scan_once(
        &self,
        platform: Platform,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        let parser = self.parser_for(platform)?;
        self.scan_parser(parser, cancel).await
    }

    /// Import one manually supplied export file for a platform.
    ///
    /// Imports never touch the platform's cursor and never clean up the
    /// source file; re-importing the same file is a no-op via deduplication.
    pub async fn run_import(&self, platform: Platform, path: &Path) -> Result<ScanOutcome> {
        let settings = self.config.platform(platform);
        if !settings.enabled || !self.gate.granted(platform) {
            return Ok(ScanOutcome::disabled(platform));
        }

        let parser = self.parser_for(platform)?;
        let artifact = SourceArtifact {
            platform,
            path: path.to_path_buf(),
            marker: format!("import:{}", path.display()),
            discovered_at: Utc::now(),
        };

        let mut outcome = ScanOutcome::new(platform);
        match self.process_artifact(Arc::clone(&parser), artifact.clone()).await {
            Ok(report) => {
                if report.wrote() {
                    outcome.processed = 1;
                } else {
                    outcome.skipped = 1;
                }
                fold_report(&mut outcome, report);
            }
            Err(e) => {
                outcome.failed = 1;
                outcome.failures.push(ScanFailure {
                    artifact: artifact.reference(),
                    reason: first_line(&e.to_string()),
                    streak: 1,
                });
            }
        }

        Ok(outcome)
    }

    /// Run one tier-migration pass with the current wall clock.
    pub async fn run_tier_migration(&self) -> Result<MigrationOutcome> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.migrate_tiers(Utc::now()))
            .await
            .map_err(|e| Error::Store {
                path: "migration".to_string(),
                reason: format!("migration task failed: {}", e),
            })?
    }

    /// Current engine state for the status surface.
    pub fn status(&self) -> Result<EngineStatus> {
        let state = self.state.lock().unwrap();
        let platforms = self
            .parsers
            .iter()
            .map(|parser| {
                let platform = parser.platform();
                let settings = self.config.platform(platform);
                PlatformStatus {
                    platform,
                    enabled: settings.enabled && self.gate.granted(platform),
                    installed: parser.is_installed(),
                    import_only: settings.import_only || parser.import_only(),
                    cursor: state.cursors.get(platform.as_str()).cloned().unwrap_or_default(),
                    failing_artifacts: state
                        .failure_streaks
                        .keys()
                        .filter(|k| k.starts_with(&format!("{}:", platform.as_str())))
                        .count(),
                }
            })
            .collect();
        drop(state);

        Ok(EngineStatus {
            store: self.store.stats()?,
            platforms,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ============================================
    // Scan internals
    // ============================================

    async fn scan_parser(
        &self,
        parser: Arc<dyn SourceParser>,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        let platform = parser.platform();
        let settings = self.config.platform(platform);
        if !settings.enabled || !self.gate.granted(platform) {
            return Ok(ScanOutcome::disabled(platform));
        }

        let mut outcome = ScanOutcome::new(platform);
        if parser.import_only() || settings.import_only || !parser.is_installed() {
            self.touch_cursor(platform)?;
            return Ok(outcome);
        }

        let cursor = self.cursor(platform);
        let artifacts = parser.list_new_artifacts(&cursor)?;
        tracing::debug!(platform = %platform, pending = artifacts.len(), "Scan starting");

        // Once an artifact fails, later successes still commit (dedup makes
        // their replay free) but the marker stays put so the failed artifact
        // is retried next scan.
        let mut marker_blocked = false;

        for artifact in artifacts {
            if cancel.is_cancelled() {
                outcome.status = ScanStatus::Cancelled;
                break;
            }

            match self.process_artifact(Arc::clone(&parser), artifact.clone()).await {
                Ok(report) => {
                    if report.wrote() {
                        outcome.processed += 1;
                    } else {
                        outcome.skipped += 1;
                    }
                    fold_report(&mut outcome, report);

                    if let Err(e) = parser.cleanup(&artifact) {
                        tracing::warn!(
                            artifact = %artifact.reference(),
                            error = %e,
                            "Cleanup failed, artifact left in place"
                        );
                        outcome
                            .warnings
                            .push(format!("cleanup failed for {}: {}", artifact.reference(), e));
                    }

                    self.clear_streak(platform, &artifact)?;
                    if !marker_blocked {
                        self.advance_marker(platform, &artifact)?;
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    marker_blocked = true;
                    let streak = self.bump_streak(platform, &artifact)?;
                    tracing::warn!(
                        artifact = %artifact.reference(),
                        error = %e,
                        streak,
                        "Artifact failed, leaving for next scan"
                    );
                    if outcome.failures.len() < MAX_REPORTED_FAILURES {
                        outcome.failures.push(ScanFailure {
                            artifact: artifact.reference(),
                            reason: first_line(&e.to_string()),
                            streak,
                        });
                    }
                }
            }

            // Keep the scan cooperative on large backlogs
            tokio::task::yield_now().await;
        }

        self.touch_cursor(platform)?;
        Ok(outcome)
    }

    /// Run one artifact's pipeline on the blocking pool, under the deadline.
    async fn process_artifact(
        &self,
        parser: Arc<dyn SourceParser>,
        artifact: SourceArtifact,
    ) -> Result<PipelineReport> {
        let store = Arc::clone(&self.store);
        let timeout_ms = self.config.store.artifact_timeout_ms;
        let reference = artifact.reference();

        let task = tokio::task::spawn_blocking(move || {
            pipeline::process_artifact(parser.as_ref(), &artifact, &store)
        });

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::Store {
                path: reference,
                reason: format!("pipeline task failed: {}", join_err),
            }),
            Err(_) => Err(Error::Timeout {
                artifact: reference,
                timeout_ms,
            }),
        }
    }

    fn parser_for(&self, platform: Platform) -> Result<Arc<dyn SourceParser>> {
        self.parsers
            .iter()
            .find(|p| p.platform() == platform)
            .cloned()
            .ok_or_else(|| Error::UnknownPlatform(platform.as_str().to_string()))
    }

    // ============================================
    // Durable state
    // ============================================

    fn cursor(&self, platform: Platform) -> SourceCursor {
        self.state
            .lock()
            .unwrap()
            .cursors
            .get(platform.as_str())
            .cloned()
            .unwrap_or_default()
    }

    fn advance_marker(&self, platform: Platform, artifact: &SourceArtifact) -> Result<()> {
        self.mutate_state(|state| {
            state
                .cursors
                .entry(platform.as_str().to_string())
                .or_default()
                .last_seen_marker = Some(artifact.marker.clone());
        })
    }

    fn touch_cursor(&self, platform: Platform) -> Result<()> {
        self.mutate_state(|state| {
            state
                .cursors
                .entry(platform.as_str().to_string())
                .or_default()
                .last_scan_at = Some(Utc::now());
        })
    }

    fn bump_streak(&self, platform: Platform, artifact: &SourceArtifact) -> Result<u32> {
        let key = streak_key(platform, artifact);
        let mut streak = 0;
        self.mutate_state(|state| {
            let entry = state.failure_streaks.entry(key.clone()).or_insert(0);
            *entry += 1;
            streak = *entry;
        })?;
        Ok(streak)
    }

    fn clear_streak(&self, platform: Platform, artifact: &SourceArtifact) -> Result<()> {
        let key = streak_key(platform, artifact);
        self.mutate_state(|state| {
            state.failure_streaks.remove(&key);
        })
    }

    fn mutate_state<F: FnOnce(&mut SchedulerState)>(&self, mutate: F) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        mutate(&mut state);
        persist_state(&self.state_path, &state)
    }
}

fn streak_key(platform: Platform, artifact: &SourceArtifact) -> String {
    format!("{}:{}", platform.as_str(), artifact.reference())
}

fn fold_report(outcome: &mut ScanOutcome, report: PipelineReport) {
    outcome.conversations_new += report.conversations_new;
    outcome.conversations_merged += report.conversations_merged;
    outcome.messages_added += report.messages_added;
    outcome.warnings.extend(report.warnings);
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or(s).to_string()
}

fn load_state(path: &Path) -> Result<SchedulerState> {
    if !path.exists() {
        return Ok(SchedulerState::default());
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(state) => Ok(state),
        Err(e) => {
            // A corrupt cursor file only costs a replay, which dedup absorbs
            tracing::warn!(path = %path.display(), error = %e, "Resetting corrupt scheduler state");
            Ok(SchedulerState::default())
        }
    }
}

fn persist_state(path: &Path, state: &SchedulerState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
    std::fs::rename(&tmp, path).map_err(|e| Error::Store {
        path: path.display().to_string(),
        reason: format!("state rename failed: {}", e),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ParsedArtifact, RawConversation, RawMessage, RawTimestamp};
    use tempfile::TempDir;

    /// Scripted parser: a fixed artifact list with per-artifact behavior.
    struct ScriptedParser {
        platform: Platform,
        artifacts: Vec<SourceArtifact>,
        /// Artifact markers that should fail to parse
        failing: Vec<String>,
        /// Parse delay, for exercising the deadline
        delay: Option<Duration>,
        cleaned: Mutex<Vec<String>>,
    }

    impl ScriptedParser {
        fn new(platform: Platform, markers: &[&str]) -> Self {
            Self {
                platform,
                artifacts: markers
                    .iter()
                    .map(|m| SourceArtifact {
                        platform,
                        path: PathBuf::from(format!("/src/{}", m)),
                        marker: m.to_string(),
                        discovered_at: Utc::now(),
                    })
                    .collect(),
                failing: Vec::new(),
                delay: None,
                cleaned: Mutex::new(Vec::new()),
            }
        }
    }

    impl SourceParser for ScriptedParser {
        fn platform(&self) -> Platform {
            self.platform
        }

        fn root_path(&self) -> Option<PathBuf> {
            None
        }

        fn is_installed(&self) -> bool {
            true
        }

        fn list_new_artifacts(&self, cursor: &SourceCursor) -> Result<Vec<SourceArtifact>> {
            let committed = cursor.last_seen_marker.as_deref();
            Ok(self
                .artifacts
                .iter()
                .skip_while(|a| match committed {
                    Some(m) => a.marker.as_str() <= m,
                    None => false,
                })
                .cloned()
                .collect())
        }

        fn parse(&self, artifact: &SourceArtifact) -> Result<ParsedArtifact> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.failing.contains(&artifact.marker) {
                return Err(Error::Parse {
                    platform: self.platform.as_str().to_string(),
                    artifact: artifact.reference(),
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(ParsedArtifact {
                conversations: vec![RawConversation {
                    platform: self.platform,
                    native_id: Some(artifact.marker.clone()),
                    messages: vec![RawMessage {
                        native_id: None,
                        role: "user".to_string(),
                        content: format!("content of {}", artifact.marker),
                        timestamp: RawTimestamp::EpochMillis(1_700_000_000_000),
                        seq: None,
                    }],
                    discovered_at: artifact.discovered_at,
                }],
                unit_errors: Vec::new(),
            })
        }

        fn cleanup(&self, artifact: &SourceArtifact) -> Result<()> {
            self.cleaned.lock().unwrap().push(artifact.marker.clone());
            Ok(())
        }
    }

    fn scheduler_with(
        tmp: &TempDir,
        parser: Arc<dyn SourceParser>,
        config: Config,
    ) -> Arc<Scheduler> {
        let store = Arc::new(Store::open(&tmp.path().join("store")).unwrap());
        Arc::new(
            Scheduler::with_parsers(config, store, vec![parser], Arc::new(AllowAll)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_scan_commits_and_advances_cursor() {
        let tmp = TempDir::new().unwrap();
        let parser = Arc::new(ScriptedParser::new(Platform::Augment, &["a1", "a2"]));
        let scheduler = scheduler_with(&tmp, parser.clone() as Arc<dyn SourceParser>, Config::default());

        let cancel = CancellationToken::new();
        let outcome = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.status, ScanStatus::Completed);
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.conversations_new, 2);
        assert_eq!(
            scheduler.cursor(Platform::Augment).last_seen_marker.as_deref(),
            Some("a2")
        );
        assert_eq!(scheduler.store().index().unwrap().total_conversations, 2);

        // Cleanup ran for committed artifacts
        assert_eq!(*parser.cleaned.lock().unwrap(), vec!["a1", "a2"]);

        // Second scan finds nothing new
        let again = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();
        assert_eq!(again.processed + again.skipped, 0);
    }

    #[tokio::test]
    async fn test_failure_blocks_cursor_but_not_later_artifacts() {
        let tmp = TempDir::new().unwrap();
        let mut inner = ScriptedParser::new(Platform::Augment, &["a1", "a2", "a3"]);
        inner.failing = vec!["a2".to_string()];
        let parser = Arc::new(inner);
        let scheduler = scheduler_with(&tmp, parser.clone() as Arc<dyn SourceParser>, Config::default());

        let cancel = CancellationToken::new();
        let outcome = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].streak, 1);

        // Marker stops before the failed artifact so it is retried
        assert_eq!(
            scheduler.cursor(Platform::Augment).last_seen_marker.as_deref(),
            Some("a1")
        );
        // But a3 was still committed
        assert_eq!(scheduler.store().index().unwrap().total_conversations, 2);

        // Retry: a2 still fails with a longer streak, a3 replays as a no-op
        let retry = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();
        assert_eq!(retry.failed, 1);
        assert_eq!(retry.failures[0].streak, 2);
        assert_eq!(retry.skipped, 1);
        assert_eq!(scheduler.store().index().unwrap().total_conversations, 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_artifacts() {
        let tmp = TempDir::new().unwrap();
        let parser = Arc::new(ScriptedParser::new(Platform::Augment, &["a1", "a2"]));
        let scheduler = scheduler_with(&tmp, parser as Arc<dyn SourceParser>, Config::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.status, ScanStatus::Cancelled);
        assert_eq!(outcome.processed, 0);
        assert!(scheduler.cursor(Platform::Augment).last_seen_marker.is_none());
    }

    #[tokio::test]
    async fn test_disabled_platform_reports_disabled() {
        let tmp = TempDir::new().unwrap();
        let config: Config = toml::from_str(
            r#"
[platforms.augment]
enabled = false
"#,
        )
        .unwrap();
        let parser = Arc::new(ScriptedParser::new(Platform::Augment, &["a1"]));
        let scheduler = scheduler_with(&tmp, parser as Arc<dyn SourceParser>, config);

        let cancel = CancellationToken::new();
        let outcome = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Disabled);
        assert_eq!(outcome.processed, 0);
    }

    #[tokio::test]
    async fn test_permission_gate_denies() {
        struct DenyAll;
        impl PermissionGate for DenyAll {
            fn granted(&self, _platform: Platform) -> bool {
                false
            }
        }

        let tmp = TempDir::new().unwrap();
        let store = Arc::new(Store::open(&tmp.path().join("store")).unwrap());
        let parser: Arc<dyn SourceParser> =
            Arc::new(ScriptedParser::new(Platform::Augment, &["a1"]));
        let scheduler =
            Scheduler::with_parsers(Config::default(), store, vec![parser], Arc::new(DenyAll))
                .unwrap();

        let cancel = CancellationToken::new();
        let outcome = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Disabled);
    }

    #[tokio::test]
    async fn test_artifact_deadline_enforced() {
        let tmp = TempDir::new().unwrap();
        let mut inner = ScriptedParser::new(Platform::Augment, &["slow"]);
        inner.delay = Some(Duration::from_millis(300));
        let parser = Arc::new(inner);
        let config: Config = toml::from_str(
            r#"
[store]
artifact_timeout_ms = 50
"#,
        )
        .unwrap();
        let scheduler = scheduler_with(&tmp, parser as Arc<dyn SourceParser>, config);

        let cancel = CancellationToken::new();
        let outcome = scheduler
            .run_scan_once(Platform::Augment, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert!(outcome.failures[0].reason.contains("timed out"));
        assert!(scheduler.cursor(Platform::Augment).last_seen_marker.is_none());
    }

    #[tokio::test]
    async fn test_cursor_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let parser: Arc<dyn SourceParser> =
            Arc::new(ScriptedParser::new(Platform::Augment, &["a1"]));
        let cancel = CancellationToken::new();

        {
            let scheduler = scheduler_with(&tmp, Arc::clone(&parser), Config::default());
            scheduler
                .run_scan_once(Platform::Augment, &cancel)
                .await
                .unwrap();
        }

        // A fresh scheduler over the same store resumes from the marker
        let scheduler = scheduler_with(&tmp, parser, Config::default());
        assert_eq!(
            scheduler.cursor(Platform::Augment).last_seen_marker.as_deref(),
            Some("a1")
        );
    }

    #[tokio::test]
    async fn test_status_reports_platforms() {
        let tmp = TempDir::new().unwrap();
        let parser: Arc<dyn SourceParser> =
            Arc::new(ScriptedParser::new(Platform::Augment, &["a1"]));
        let scheduler = scheduler_with(&tmp, parser, Config::default());

        let status = scheduler.status().unwrap();
        assert_eq!(status.platforms.len(), 1);
        assert!(status.platforms[0].enabled);
        assert_eq!(status.store.index.total_conversations, 0);
    }
}
