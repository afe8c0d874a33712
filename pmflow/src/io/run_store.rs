//! Persisted flow run records (`<dir>/<run_id>.json`), one file per run.
//!
//! Records are the durable answer to "what happened to my project plan";
//! tracing output is diagnostics only.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    /// The flow finished but some cards could not be created.
    PartiallyFailed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::PartiallyFailed | RunStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub status: RunStatus,
    /// Last flow phase entered (`research`, `board_setup`, ...).
    pub phase: Option<String>,
    pub error: Option<String>,
    pub cards_created: usize,
    pub cards_failed: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn queued(run_id: Uuid, project_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            project_id,
            status: RunStatus::Queued,
            phase: None,
            error: None,
            cards_created: 0,
            cards_failed: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Directory of run records.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Load a record; `None` when the run is unknown.
    pub fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read run {}", path.display()))?;
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("parse run {}", path.display()))?;
        Ok(Some(record))
    }

    /// Atomically write a record (temp file + rename).
    pub fn write(&self, record: &RunRecord) -> Result<()> {
        let path = self.path_for(record.run_id);
        debug!(path = %path.display(), status = ?record.status, "writing run record");
        let mut buf = serde_json::to_string_pretty(record)?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    /// Load, modify and write back a record, bumping `updated_at`.
    pub fn update(&self, run_id: Uuid, apply: impl FnOnce(&mut RunRecord)) -> Result<RunRecord> {
        let mut record = self
            .load(run_id)?
            .with_context(|| format!("unknown run {run_id}"))?;
        apply(&mut record);
        record.updated_at = Utc::now();
        self.write(&record)?;
        Ok(record)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies write → load preserves all fields.
    #[test]
    fn run_record_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RunStore::new(temp.path().join("runs"));
        let record = RunRecord::queued(Uuid::new_v4(), Uuid::new_v4());
        store.write(&record).expect("write");
        assert_eq!(store.load(record.run_id).expect("load"), Some(record));
    }

    #[test]
    fn unknown_run_loads_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RunStore::new(temp.path());
        assert_eq!(store.load(Uuid::new_v4()).expect("load"), None);
        assert!(store.update(Uuid::new_v4(), |_| {}).is_err());
    }

    /// Verifies update applies the change and leaves no temp file behind.
    #[test]
    fn update_persists_changes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RunStore::new(temp.path());
        let record = RunRecord::queued(Uuid::new_v4(), Uuid::new_v4());
        store.write(&record).expect("write");

        let updated = store
            .update(record.run_id, |r| {
                r.status = RunStatus::PartiallyFailed;
                r.cards_created = 9;
                r.cards_failed = 1;
            })
            .expect("update");
        assert!(updated.status.is_terminal());
        assert!(updated.updated_at >= record.updated_at);

        let loaded = store.load(record.run_id).expect("load").expect("exists");
        assert_eq!(loaded.cards_failed, 1);
        assert!(!store.path_for(record.run_id).with_extension("json.tmp").exists());
    }
}
