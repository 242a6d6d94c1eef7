use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::response::{ConsentDecision, ConsentResponse};
use crate::error::RecorderError;
use crate::types::ParticipantId;

/// Consent decisions keyed by participant.
///
/// A missing entry means the participant has not decided yet, which is
/// treated the same as a denial when recordings are flushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentRecord {
    decisions: BTreeMap<ParticipantId, bool>,
}

impl ConsentRecord {
    pub fn decision(&self, participant: ParticipantId) -> Option<ConsentDecision> {
        self.decisions.get(&participant).copied().map(Into::into)
    }

    pub fn is_decided(&self, participant: ParticipantId) -> bool {
        self.decisions.contains_key(&participant)
    }

    pub fn is_granted(&self, participant: ParticipantId) -> bool {
        self.decisions.get(&participant).copied().unwrap_or(false)
    }

    pub fn set(&mut self, participant: ParticipantId, decision: ConsentDecision) {
        self.decisions.insert(participant, decision.is_granted());
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// JSON-file backed consent store.
///
/// `load` and `save` are best effort: read failures degrade to an empty
/// record and write failures are logged. Mutations go through
/// [`ConsentStore::record_decision`], which holds a lock across
/// load, mutate and save so concurrent answers never overwrite each other.
pub struct ConsentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConsentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole consent document
    pub async fn load(&self) -> ConsentRecord {
        match self.read_document().await {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to load consent data: {}", e);
                ConsentRecord::default()
            }
        }
    }

    /// Replace the consent document
    pub async fn save(&self, record: &ConsentRecord) {
        if let Err(e) = self.write_document(record).await {
            error!("Failed to save consent data: {}", e);
        }
    }

    /// Store a participant's decision and return the updated record
    pub async fn record_decision(&self, response: &ConsentResponse) -> ConsentRecord {
        let _guard = self.write_lock.lock().await;

        let mut record = self.load().await;
        record.set(response.participant_id, response.decision);
        self.save(&record).await;

        info!(
            "Stored consent for participant {}: {:?}",
            response.participant_id, response.decision
        );

        record
    }

    async fn read_document(&self) -> Result<ConsentRecord, RecorderError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No consent file at {}", self.path.display());
                return Ok(ConsentRecord::default());
            }
            Err(e) => return Err(RecorderError::ConsentStoreIo(e.to_string())),
        };

        serde_json::from_slice(&raw).map_err(|e| RecorderError::ConsentStoreIo(e.to_string()))
    }

    async fn write_document(&self, record: &ConsentRecord) -> Result<(), RecorderError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecorderError::ConsentStoreIo(e.to_string()))?;
        }

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| RecorderError::ConsentStoreIo(e.to_string()))?;

        // Readers never see a half-written document
        let staging = self.staging_path();
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| RecorderError::ConsentStoreIo(e.to_string()))?;

        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(RecorderError::ConsentStoreIo(e.to_string()));
        }

        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "consent.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = ConsentStore::new(dir.path().join("consent.json"));

        let record = store.load().await;
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("consent.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = ConsentStore::new(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_decisions_persist_as_string_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("consent.json");
        let store = ConsentStore::new(&path);

        store.record_decision(&ConsentResponse::allow(ParticipantId(1))).await;
        store.record_decision(&ConsentResponse::deny(ParticipantId(2))).await;

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["1"], serde_json::Value::Bool(true));
        assert_eq!(raw["2"], serde_json::Value::Bool(false));

        let record = store.load().await;
        assert_eq!(record.decision(ParticipantId(1)), Some(ConsentDecision::Granted));
        assert_eq!(record.decision(ParticipantId(2)), Some(ConsentDecision::Denied));
        assert_eq!(record.decision(ParticipantId(3)), None);
        assert!(!record.is_granted(ParticipantId(3)));
    }

    #[tokio::test]
    async fn test_decision_can_be_changed() {
        let dir = TempDir::new().unwrap();
        let store = ConsentStore::new(dir.path().join("consent.json"));

        store.record_decision(&ConsentResponse::allow(ParticipantId(5))).await;
        store.record_decision(&ConsentResponse::deny(ParticipantId(5))).await;

        let record = store.load().await;
        assert_eq!(record.len(), 1);
        assert!(!record.is_granted(ParticipantId(5)));
    }

    #[tokio::test]
    async fn test_concurrent_decisions_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConsentStore::new(dir.path().join("nested").join("consent.json")));

        let tasks: Vec<_> = (0..20u64)
            .map(|id| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.record_decision(&ConsentResponse::allow(ParticipantId(id))).await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let record = store.load().await;
        assert_eq!(record.len(), 20);
        assert!((0..20u64).all(|id| record.is_granted(ParticipantId(id))));
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("consent.json");
        let store = Arc::new(ConsentStore::new(&path));
        store.record_decision(&ConsentResponse::allow(ParticipantId(1000))).await;

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for id in 0..50u64 {
                    store.record_decision(&ConsentResponse::deny(ParticipantId(id))).await;
                }
            })
        };

        for _ in 0..200 {
            assert!(store.load().await.is_granted(ParticipantId(1000)));
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        assert_eq!(store.load().await.len(), 51);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
