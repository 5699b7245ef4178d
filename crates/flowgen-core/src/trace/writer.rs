//! JSONL append-only writer for session traces.
//!
//! One file per generation session, named after the driver's session id:
//! `<workspace>/.flowgen/traces/{day}/{session_id}.jsonl`. The day is fixed
//! by the session's first record, so a run that crosses midnight still
//! lands in a single file, and `generate` followed by `resume` leaves two
//! files (the resumed run is a fresh session).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::TraceRecord;

/// Appends [`TraceRecord`]s to per-session JSONL files.
///
/// Cloning is cheap and clones share the session-to-file map, so the CLI
/// can keep a handle to report where a driver's trace went.
#[derive(Clone)]
pub struct TraceWriter {
    base_dir: PathBuf,
    /// Session id -> trace file. Held across each write so lines from
    /// concurrent appends never interleave.
    files: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl TraceWriter {
    /// Traces go under `<workspace_root>/.flowgen/traces/`.
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self::with_base_dir(workspace_root.as_ref().join(".flowgen").join("traces"))
    }

    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Trace file of a session, once it has at least one record.
    pub async fn session_file(&self, session_id: &str) -> Option<PathBuf> {
        self.files.lock().await.get(session_id).cloned()
    }

    /// Append one record to its session's file.
    pub async fn append(&self, record: &TraceRecord) -> Result<(), TraceWriteError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| TraceWriteError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut files = self.files.lock().await;
        let path = match files.get(&record.session_id) {
            Some(path) => path.clone(),
            None => {
                let path = self.open_session_file(&record.session_id).await?;
                tracing::debug!("[Trace] session {} -> {}", record.session_id, path.display());
                files.insert(record.session_id.clone(), path.clone());
                path
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| TraceWriteError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TraceWriteError::Io(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| TraceWriteError::Io(e.to_string()))?;

        Ok(())
    }

    /// Append a record, logging failures.
    ///
    /// Tracing is an audit aid: a full disk or unwritable workspace must
    /// never fail the session that is being traced.
    pub async fn append_safe(&self, record: &TraceRecord) {
        if let Err(e) = self.append(record).await {
            tracing::warn!("[Trace] Failed to write trace for {}: {}", record.session_id, e);
        }
    }

    async fn open_session_file(&self, session_id: &str) -> Result<PathBuf, TraceWriteError> {
        let day_dir = self.base_dir.join(Local::now().format("%Y-%m-%d").to_string());
        fs::create_dir_all(&day_dir)
            .await
            .map_err(|e| TraceWriteError::Io(format!("Failed to create trace dir: {}", e)))?;
        Ok(day_dir.join(format!("{}.jsonl", file_stem(session_id))))
    }
}

/// Session ids are uuids, but anything else still has to be a safe name.
fn file_stem(session_id: &str) -> String {
    let stem: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "session".to_string()
    } else {
        stem
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceWriteError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Contributor, TraceEventType};

    fn record(session: &str, kind: TraceEventType) -> TraceRecord {
        TraceRecord::new(session, kind, Contributor::new("claude", None))
    }

    fn event_types(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["eventType"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_one_file_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path());
        assert!(writer.base_dir().ends_with(".flowgen/traces"));
        assert!(writer.session_file("s1").await.is_none());

        writer.append(&record("s1", TraceEventType::SessionStart)).await.unwrap();
        writer.append(&record("s2", TraceEventType::SessionStart)).await.unwrap();
        writer.append(&record("s1", TraceEventType::SessionEnd)).await.unwrap();

        let first = writer.session_file("s1").await.unwrap();
        let second = writer.session_file("s2").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(first.file_name().unwrap(), "s1.jsonl");

        let today = Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(first.parent().unwrap(), writer.base_dir().join(today));

        assert_eq!(event_types(&first), vec!["session_start", "session_end"]);
        assert_eq!(event_types(&second), vec!["session_start"]);
    }

    #[tokio::test]
    async fn test_clones_share_session_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path());
        let handle = writer.clone();

        writer.append(&record("s1", TraceEventType::UserMessage)).await.unwrap();
        handle.append(&record("s1", TraceEventType::FinalResult)).await.unwrap();

        let path = handle.session_file("s1").await.unwrap();
        assert_eq!(event_types(&path), vec!["user_message", "final_result"]);
    }

    #[tokio::test]
    async fn test_append_safe_swallows_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let writer = TraceWriter::with_base_dir(&blocker);
        let rec = record("s1", TraceEventType::SessionStart);
        assert!(matches!(writer.append(&rec).await, Err(TraceWriteError::Io(_))));
        writer.append_safe(&rec).await;
        assert!(writer.session_file("s1").await.is_none());
    }

    #[test]
    fn test_file_stem_is_path_safe() {
        assert_eq!(file_stem("7f3c-11aa_b"), "7f3c-11aa_b");
        assert_eq!(file_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(file_stem(""), "session");
    }
}
