//! # mnemon-core
//!
//! Core library for mnemon - a memory consolidation engine for AI assistant
//! conversation history.
//!
//! This library provides:
//! - Canonical domain types for messages, conversations, and facts
//! - Source parsers for platform-native stores (JSON chunks, SQLite, JSONL)
//! - A tiered append-only consolidation store with archive roll-ups
//! - A per-platform polling scheduler with cancellation and cursors
//!
//! ## Architecture
//!
//! Data flows through four stages:
//! - **Sources:** platform artifacts parsed into raw conversations
//! - **Normalize:** raw records mapped onto the canonical model
//! - **Dedup + Extract:** new content identified, facts derived
//! - **Store:** records committed to age tiers, index kept consistent
//!
//! ## Example
//!
//! ```rust,no_run
//! use mnemon_core::{Config, Scheduler, Store};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let store = Arc::new(Store::open(&config.store_root()).expect("failed to open store"));
//! let scheduler = Scheduler::new(config, store).expect("failed to build scheduler");
//! # let _ = scheduler;
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use scheduler::{AllowAll, EngineStatus, PermissionGate, Scheduler};
pub use store::{Store, StoreView};
pub use types::*;

// Public modules
pub mod config;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod types;
