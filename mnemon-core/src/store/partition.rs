//! Record-log encoding for tier partitions
//!
//! Each partition file is line-oriented JSON with append-supersede
//! semantics: commits append a new version of a record's line, readers keep
//! the last line per key, and migration compacts by rewriting. This gives
//! streaming append, full re-read for index rebuilds, and single-record
//! update without rewriting the whole partition.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Load a record log, keeping the last line per key.
///
/// Corrupt lines are logged and skipped so one bad write never makes a
/// partition unreadable; the next compaction drops them for good.
pub fn load_log<T, F>(path: &Path, key_fn: F) -> Result<BTreeMap<String, T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> String,
{
    let mut records = BTreeMap::new();

    if !path.exists() {
        return Ok(records);
    }

    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => {
                records.insert(key_fn(&record), record);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping corrupt record line"
                );
            }
        }
    }

    Ok(records)
}

/// Append one record line to a log.
pub fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Rewrite a log with exactly the given records (compaction).
///
/// Writes to a temp file first and renames over the original so readers
/// never observe a half-written partition.
pub fn rewrite_log<'a, T, I>(path: &Path, records: I) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        for record in records {
            let mut line = serde_json::to_string(record)?;
            line.push('\n');
            tmp.write_all(line.as_bytes())?;
        }
        tmp.flush()?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| Error::Store {
        path: path.display().to_string(),
        reason: format!("compaction rename failed: {}", e),
    })?;
    Ok(())
}
