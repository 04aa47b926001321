use super::{merge_into, AlertStore, Snapshot, SnapshotKind, SnapshotStore};
use crate::error::PersistenceFailure;
use crate::models::{Completed, PersistedAlert};
use crate::state::{new_state, Shared};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// Backend process-local, perdu au redémarrage
#[derive(Clone, Default)]
pub struct MemoryStore {
    alerts: Shared<BTreeMap<String, PersistedAlert>>,
    snapshots: Shared<HashMap<SnapshotKind, Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            alerts: new_state(BTreeMap::new()),
            snapshots: new_state(HashMap::new()),
        }
    }

    /// Pré-remplit la table (tests)
    pub fn with_alerts(alerts: Vec<PersistedAlert>) -> Self {
        let store = Self::new();
        store
            .alerts
            .lock()
            .extend(alerts.into_iter().map(|a| (a.alert_table_id.clone(), a)));
        store
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn replace(&self, kind: SnapshotKind, data: serde_json::Value) -> Result<Snapshot, PersistenceFailure> {
        let snapshot = Snapshot::new(kind, data);
        self.snapshots.lock().insert(kind, snapshot.clone());
        Ok(snapshot)
    }

    async fn latest(&self, kind: SnapshotKind) -> Result<Option<Snapshot>, PersistenceFailure> {
        Ok(self.snapshots.lock().get(&kind).cloned())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn load_alerts(&self) -> Result<Vec<PersistedAlert>, PersistenceFailure> {
        Ok(self.alerts.lock().values().cloned().collect())
    }

    async fn merge_alerts(&self, records: Vec<PersistedAlert>) -> Result<usize, PersistenceFailure> {
        Ok(merge_into(&mut self.alerts.lock(), records))
    }

    async fn set_completed(&self, alert_table_id: &str, completed: Completed) -> Result<bool, PersistenceFailure> {
        match self.alerts.lock().get_mut(alert_table_id) {
            Some(row) => {
                row.completed = completed;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
