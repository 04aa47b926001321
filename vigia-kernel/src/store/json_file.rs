/**
 * BACKEND JSON - Fichiers sous `data_dir`
 *
 * FONCTIONNEMENT :
 * - `alerts.json` : tableau des alertes triées par `alert_table_id`
 * - `snapshot_<kind>.json` : la ligne unique du type
 * - chaque écriture passe par un fichier temporaire puis `rename`, un crash
 *   laisse donc l'ancienne ou la nouvelle version, jamais aucune
 * - cache mémoire `parking_lot` chargé à l'ouverture, relu pour les lectures
 */

use super::{merge_into, AlertStore, Snapshot, SnapshotKind, SnapshotStore};
use crate::error::PersistenceFailure;
use crate::models::{Completed, PersistedAlert};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const ALERTS_FILE: &str = "alerts.json";

pub struct JsonFileStore {
    dir: PathBuf,
    alerts: Mutex<BTreeMap<String, PersistedAlert>>,
    snapshots: Mutex<HashMap<SnapshotKind, Snapshot>>,
    /// Sérialise les écritures disque (le cache parking_lot n'est jamais tenu pendant un await)
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Ouvre (ou crée) le répertoire et charge l'état existant
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, PersistenceFailure> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let alerts_path = dir.join(ALERTS_FILE);
        let alerts: Vec<PersistedAlert> = if alerts_path.exists() {
            serde_json::from_str(&fs::read_to_string(&alerts_path)?)?
        } else {
            Vec::new()
        };

        let mut snapshots = HashMap::new();
        for kind in SnapshotKind::ALL {
            let path = snapshot_path(&dir, kind);
            if path.exists() {
                let snapshot: Snapshot = serde_json::from_str(&fs::read_to_string(&path)?)?;
                snapshots.insert(kind, snapshot);
            }
        }

        tracing::debug!(alerts = alerts.len(), snapshots = snapshots.len(), "json store loaded");
        Ok(Self {
            dir,
            alerts: Mutex::new(alerts.into_iter().map(|a| (a.alert_table_id.clone(), a)).collect()),
            snapshots: Mutex::new(snapshots),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn save_alerts(&self, table: &BTreeMap<String, PersistedAlert>) -> Result<(), PersistenceFailure> {
        let rows: Vec<&PersistedAlert> = table.values().collect();
        let json = serde_json::to_vec_pretty(&rows)?;
        write_atomic(&self.dir.join(ALERTS_FILE), &json).await
    }
}

fn snapshot_path(dir: &Path, kind: SnapshotKind) -> PathBuf {
    dir.join(format!("snapshot_{}.json", kind.as_str()))
}

/// Fichier voisin propre à une écriture; une écriture abandonnée ne peut
/// pas croiser la suivante
fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

/// Écrit `bytes` dans un fichier voisin puis le renomme sur `path`
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceFailure> {
    let tmp = temp_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;
    if result.is_err() {
        tokio::fs::remove_file(&tmp).await.ok();
    }
    Ok(result?)
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn replace(&self, kind: SnapshotKind, data: serde_json::Value) -> Result<Snapshot, PersistenceFailure> {
        let _writer = self.write_lock.lock().await;
        let snapshot = Snapshot::new(kind, data);
        let json = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(&snapshot_path(&self.dir, kind), &json).await?;
        self.snapshots.lock().insert(kind, snapshot.clone());
        tracing::debug!(%kind, id = %snapshot.id, "snapshot replaced");
        Ok(snapshot)
    }

    async fn latest(&self, kind: SnapshotKind) -> Result<Option<Snapshot>, PersistenceFailure> {
        Ok(self.snapshots.lock().get(&kind).cloned())
    }
}

#[async_trait]
impl AlertStore for JsonFileStore {
    async fn load_alerts(&self) -> Result<Vec<PersistedAlert>, PersistenceFailure> {
        Ok(self.alerts.lock().values().cloned().collect())
    }

    async fn merge_alerts(&self, records: Vec<PersistedAlert>) -> Result<usize, PersistenceFailure> {
        let _writer = self.write_lock.lock().await;
        let mut table = self.alerts.lock().clone();
        let written = merge_into(&mut table, records);
        if written > 0 {
            self.save_alerts(&table).await?;
            *self.alerts.lock() = table;
        }
        Ok(written)
    }

    async fn set_completed(&self, alert_table_id: &str, completed: Completed) -> Result<bool, PersistenceFailure> {
        let _writer = self.write_lock.lock().await;
        let mut table = self.alerts.lock().clone();
        let Some(row) = table.get_mut(alert_table_id) else {
            return Ok(false);
        };
        if row.completed == completed {
            return Ok(true);
        }
        row.completed = completed;
        self.save_alerts(&table).await?;
        *self.alerts.lock() = table;
        Ok(true)
    }
}
