//! State persistence
//!
//! Keyed, last-write-wins storage for session records plus append-only
//! checkpoint logs. The engine talks to the trait only; deployments pick
//! the in-memory store (tests, embedding) or the JSON-file store.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use super::checkpoint::WorkflowCheckpoint;
use crate::error::{EngineError, ErrorDetail};
use crate::scoring::CoordinationResult;
use crate::session::AnalysisSession;

/// Everything persisted about one analysis: the session, and on terminal
/// states either its result or its error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: AnalysisSession,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CoordinationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl SessionRecord {
    pub fn new(session: AnalysisSession) -> Self {
        Self {
            session,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

pub trait StateStore: Send + Sync {
    /// Last-write-wins upsert of a session record
    fn put_record(&self, record: &SessionRecord) -> Result<(), StoreError>;

    fn get_record(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError>;

    /// Append one checkpoint to the session's log
    fn append_checkpoint(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), StoreError>;

    /// Checkpoint log in append order
    fn checkpoints(&self, session_id: Uuid) -> Result<Vec<WorkflowCheckpoint>, StoreError>;

    /// Sessions persisted in a non-terminal state (recovery candidates)
    fn in_flight(&self) -> Result<Vec<Uuid>, StoreError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<Uuid, SessionRecord>>,
    checkpoints: Mutex<HashMap<Uuid, Vec<WorkflowCheckpoint>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn put_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.session.id, record.clone());
        Ok(())
    }

    fn get_record(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.lock().get(&session_id).cloned())
    }

    fn append_checkpoint(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), StoreError> {
        self.checkpoints
            .lock()
            .entry(checkpoint.session_id)
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    fn checkpoints(&self, session_id: Uuid) -> Result<Vec<WorkflowCheckpoint>, StoreError> {
        Ok(self
            .checkpoints
            .lock()
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn in_flight(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| !r.session.status.is_terminal())
            .map(|r| r.session.id)
            .collect())
    }
}

// ============================================================================
// FILE STORE
// ============================================================================

/// On-disk layout: one JSON document per session under the root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    record: SessionRecord,
    #[serde(default)]
    checkpoints: Vec<WorkflowCheckpoint>,
}

pub struct FileStateStore {
    root: PathBuf,
    // Serializes read-modify-write cycles on session files
    write_lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, session_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", session_id))
    }

    fn load(&self, session_id: Uuid) -> Result<Option<StoredSession>, StoreError> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let stored = serde_json::from_str(&content).map_err(|e| StoreError::Serde(e.to_string()))?;
        Ok(Some(stored))
    }

    fn save(&self, stored: &StoredSession) -> Result<(), StoreError> {
        let path = self.session_path(stored.record.session.id);
        let json =
            serde_json::to_string_pretty(stored).map_err(|e| StoreError::Serde(e.to_string()))?;
        // Write-then-rename keeps readers off half-written documents
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn put_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let checkpoints = self
            .load(record.session.id)?
            .map(|s| s.checkpoints)
            .unwrap_or_default();
        self.save(&StoredSession {
            record: record.clone(),
            checkpoints,
        })
    }

    fn get_record(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.load(session_id)?.map(|s| s.record))
    }

    fn append_checkpoint(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut stored = self
            .load(checkpoint.session_id)?
            .ok_or_else(|| StoreError::Io(format!("no record for {}", checkpoint.session_id)))?;
        stored.checkpoints.push(checkpoint.clone());
        self.save(&stored)
    }

    fn checkpoints(&self, session_id: Uuid) -> Result<Vec<WorkflowCheckpoint>, StoreError> {
        Ok(self
            .load(session_id)?
            .map(|s| s.checkpoints)
            .unwrap_or_default())
    }

    fn in_flight(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::Io(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let path = entry.path();
            if path.extension().map(|e| e == "json") != Some(true) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = stem.parse::<Uuid>() else {
                continue;
            };
            if let Some(stored) = self.load(id)? {
                if !stored.record.session.status.is_terminal() {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AnalysisDepth, AnalysisStatus, AttackSession};
    use crate::workflow::checkpoint::StagePayload;
    use chrono::{TimeZone, Utc};

    fn sample_record() -> SessionRecord {
        let attack = AttackSession {
            source_ip: "192.0.2.1".parse().unwrap(),
            destination_ip: None,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            payload: "probe".to_string(),
            target_port: Some(22),
            protocol: None,
        };
        SessionRecord::new(AnalysisSession::new(
            vec![attack.clone(), attack],
            AnalysisDepth::Standard,
            5,
            None,
        ))
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        let record = sample_record();
        let id = record.session.id;

        store.put_record(&record).unwrap();
        let loaded = store.get_record(id).unwrap().unwrap();
        assert_eq!(loaded.session.id, id);
        assert_eq!(store.in_flight().unwrap(), vec![id]);
    }

    #[test]
    fn test_file_store_roundtrip_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).unwrap();

        let record = sample_record();
        let id = record.session.id;
        store.put_record(&record).unwrap();

        for seq in 0..3 {
            let cp = WorkflowCheckpoint::new(
                id,
                AnalysisStatus::ExtractingEvidence,
                seq,
                StagePayload::default(),
            );
            store.append_checkpoint(&cp).unwrap();
        }

        let checkpoints = store.checkpoints(id).unwrap();
        assert_eq!(checkpoints.len(), 3);
        assert_eq!(checkpoints[2].seq, 2);
        assert_eq!(store.in_flight().unwrap(), vec![id]);

        // Terminal record drops out of recovery scans but keeps its log
        let mut record = store.get_record(id).unwrap().unwrap();
        record.session.transition(AnalysisStatus::Failed).unwrap();
        store.put_record(&record).unwrap();
        assert!(store.in_flight().unwrap().is_empty());
        assert_eq!(store.checkpoints(id).unwrap().len(), 3);
    }

    #[test]
    fn test_file_store_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).unwrap();

        let mut record = sample_record();
        let id = record.session.id;
        store.put_record(&record).unwrap();

        record.session.transition(AnalysisStatus::Validating).unwrap();
        store.put_record(&record).unwrap();

        let loaded = store.get_record(id).unwrap().unwrap();
        assert_eq!(loaded.session.status, AnalysisStatus::Validating);
    }
}
